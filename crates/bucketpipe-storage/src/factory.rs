use crate::engine::{BucketStorage, BucketStorageOptions};
#[cfg(feature = "storage-gcs")]
use crate::gcs::GcsBucket;
#[cfg(feature = "storage-local")]
use crate::local::LocalBucket;
use crate::memory::MemoryBucket;
use crate::resolver::{filename_resolver, Fixed};
use crate::{Bucket, StorageBackend, StorageError, StorageResult};
use bucketpipe_core::Config;
use std::sync::Arc;

/// Create a bucket based on configuration
pub async fn create_bucket(config: &Config) -> StorageResult<Arc<dyn Bucket>> {
    let storage = &config.storage;

    match config.storage_backend() {
        #[cfg(feature = "storage-gcs")]
        StorageBackend::Gcs => {
            let bucket = storage
                .gcs_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("GCS_BUCKET not configured".to_string()))?;

            let bucket = GcsBucket::new(
                bucket,
                storage.gcs_service_account.clone(),
                Some(storage.gcs_public_host.clone()),
            )?;
            Ok(Arc::new(bucket))
        }

        #[cfg(not(feature = "storage-gcs"))]
        StorageBackend::Gcs => Err(StorageError::ConfigError(
            "GCS storage backend not available (storage-gcs feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = storage.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = storage.local_storage_base_url.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
            })?;

            let bucket = LocalBucket::new(base_path, base_url).await?;
            Ok(Arc::new(bucket))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        StorageBackend::Memory => Ok(Arc::new(MemoryBucket::new(
            storage.memory_bucket_name.clone(),
        ))),
    }
}

/// Build the storage engine for `bucket` from the upload settings
pub fn create_engine(config: &Config, bucket: Arc<dyn Bucket>) -> StorageResult<BucketStorage> {
    let upload = &config.upload;

    let mut options = BucketStorageOptions::new(bucket)
        .with_destination(Arc::new(Fixed::new(upload.destination.clone())))
        .with_filename(filename_resolver(upload.filename_strategy))
        .with_make_public(upload.make_public)
        .with_gzip(upload.gzip);

    if let Some(timeout) = upload.timeout {
        options = options.with_upload_timeout(timeout);
    }

    BucketStorage::new(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|name| vars.get(name).cloned()).unwrap()
    }

    #[tokio::test]
    async fn test_create_memory_bucket() {
        let config = config(&[("STORAGE_BACKEND", "memory"), ("MEMORY_BUCKET_NAME", "scratch")]);
        let bucket = create_bucket(&config).await.unwrap();
        assert_eq!(bucket.name(), "scratch");
        assert_eq!(bucket.backend_type(), StorageBackend::Memory);
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn test_create_local_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files");
        let config = config(&[
            ("STORAGE_BACKEND", "local"),
            ("LOCAL_STORAGE_PATH", path.to_str().unwrap()),
            ("LOCAL_STORAGE_BASE_URL", "http://localhost:4000/files"),
        ]);
        let bucket = create_bucket(&config).await.unwrap();
        assert_eq!(bucket.name(), "files");
        assert_eq!(bucket.backend_type(), StorageBackend::Local);
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_engine_uses_upload_settings() {
        use crate::models::{FileInfo, IncomingFile, UploadContext};
        use crate::traits::StorageEngine;

        let config = config(&[
            ("STORAGE_BACKEND", "memory"),
            ("UPLOAD_DESTINATION", "incoming"),
            ("UPLOAD_GZIP", "false"),
            ("UPLOAD_MAKE_PUBLIC", "false"),
        ]);
        let memory = MemoryBucket::new("scratch");
        let engine = create_engine(&config, Arc::new(memory.clone())).unwrap();

        let ctx = UploadContext::new();
        let file = IncomingFile::new(FileInfo::new("file", "a.txt", "text/plain"), &b"abc"[..]);
        let outcome = engine.handle_file(&ctx, file).await;

        assert_eq!(outcome.result.unwrap().filename, "incoming/a.txt");
        let object = memory.object("incoming/a.txt").unwrap();
        assert!(object.content_encoding.is_none());
        assert!(!object.public);
    }
}
