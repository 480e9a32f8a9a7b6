//! Storage setup and initialization

use anyhow::Result;
use bucketpipe_core::Config;
use bucketpipe_storage::{create_bucket, create_engine, Bucket, StorageEngine};
use std::sync::Arc;

/// Create the configured bucket and the engine that writes into it.
pub async fn setup_storage(config: &Config) -> Result<(Arc<dyn Bucket>, Arc<dyn StorageEngine>)> {
    tracing::info!("Initializing storage bucket...");
    let bucket = create_bucket(config).await?;
    tracing::info!(
        backend = ?bucket.backend_type(),
        bucket = %bucket.name(),
        "Storage bucket initialized successfully"
    );

    let upload = &config.upload;
    tracing::info!(
        destination = %upload.destination,
        filename_strategy = ?upload.filename_strategy,
        make_public = upload.make_public,
        gzip = upload.gzip,
        timeout_secs = upload.timeout.map(|t| t.as_secs()),
        "Upload policy"
    );

    let engine = create_engine(config, bucket.clone())?;
    Ok((bucket, Arc::new(engine)))
}
