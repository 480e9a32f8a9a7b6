use axum_test::TestServer;
use bucketpipe_api::setup::{routes, storage};
use bucketpipe_api::AppState;
use bucketpipe_core::Config;
use bucketpipe_storage::{create_engine, MemoryBucket, StorageEngine};
use std::collections::HashMap;
use std::sync::Arc;

pub const TEST_BUCKET: &str = "test-bucket";

/// Test application backed by an in-memory bucket
pub struct TestApp {
    pub server: TestServer,
    pub bucket: MemoryBucket,
}

impl TestApp {
    /// Get the HTTP test client
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

/// Build a configuration from the memory backend defaults plus `overrides`.
pub fn create_test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("STORAGE_BACKEND".to_string(), "memory".to_string()),
        ("MEMORY_BUCKET_NAME".to_string(), TEST_BUCKET.to_string()),
        ("MAX_FILE_SIZE_MB".to_string(), "10".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }

    let config = Config::from_vars(|key| vars.get(key).cloned()).expect("Invalid test config");
    config.validate().expect("Test config failed validation");
    config
}

/// Setup a test application with the default upload policy
pub fn setup_test_app() -> TestApp {
    setup_test_app_with(&[])
}

/// Setup a test application with configuration overrides
pub fn setup_test_app_with(overrides: &[(&str, &str)]) -> TestApp {
    let config = create_test_config(overrides);
    let bucket = MemoryBucket::new(TEST_BUCKET);
    let engine = create_engine(&config, Arc::new(bucket.clone())).expect("Failed to create engine");
    build_app(config, bucket, Arc::new(engine))
}

/// Setup a test application around a caller-built engine writing into `bucket`
pub fn setup_test_app_with_engine(bucket: MemoryBucket, engine: Arc<dyn StorageEngine>) -> TestApp {
    build_app(create_test_config(&[]), bucket, engine)
}

fn build_app(config: Config, bucket: MemoryBucket, engine: Arc<dyn StorageEngine>) -> TestApp {
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(bucket.clone()),
        engine,
    ));
    let app = routes::setup_routes(&config, state);
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp { server, bucket }
}

/// Setup a server whose bucket and engine come from `config`, as in production
pub async fn setup_server_from_config(config: Config) -> TestServer {
    let (bucket, engine) = storage::setup_storage(&config)
        .await
        .expect("Failed to setup storage");
    let state = Arc::new(AppState::new(config.clone(), bucket, engine));
    let app = routes::setup_routes(&config, state);
    TestServer::new(app.into_make_service()).expect("Failed to create test server")
}
