use crate::keys::StorageKey;
use crate::traits::{Bucket, ObjectWriter, StorageError, StorageResult, WriteOptions};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem bucket
///
/// Objects are written to `{base_path}/{key}` through a `.partial` sibling
/// that is renamed into place on finish. Files are stored uncompressed: a
/// static file server has nowhere to read a content encoding from.
#[derive(Clone)]
pub struct LocalBucket {
    name: String,
    base_path: PathBuf,
    base_url: String,
}

impl LocalBucket {
    /// Create a new LocalBucket instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for stored objects (e.g., "/var/lib/bucketpipe")
    /// * `base_url` - Base URL the directory is served from (e.g., "http://localhost:4000/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let name = base_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local".to_string());

        Ok(LocalBucket {
            name,
            base_path,
            base_url,
        })
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys that would resolve outside the base directory.
    fn key_to_path(&self, storage_key: &StorageKey) -> StorageResult<PathBuf> {
        let key = storage_key.as_str();
        if key.split('/').any(|segment| segment == "..")
            || key.starts_with('/')
            || key.contains('\\')
        {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        let path = self.base_path.join(key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    PathBuf::from(partial)
}

struct LocalObjectWriter {
    file: fs::File,
    partial_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
    start: std::time::Instant,
}

#[async_trait]
impl ObjectWriter for LocalObjectWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.file.write_all(&chunk).await?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<()> {
        let mut this = *self;
        this.file.flush().await?;
        this.file.sync_all().await?;
        fs::rename(&this.partial_path, &this.final_path).await?;

        tracing::info!(
            path = %this.final_path.display(),
            size_bytes = this.bytes_written,
            duration_ms = this.start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(())
    }
}

#[async_trait]
impl Bucket for LocalBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn public_url(&self, key: &StorageKey) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    async fn open_write(
        &self,
        key: &StorageKey,
        options: &WriteOptions,
    ) -> StorageResult<Box<dyn ObjectWriter>> {
        if options.resumable {
            return Err(StorageError::ConfigError(
                "Resumable uploads are not supported".to_string(),
            ));
        }

        let final_path = self.key_to_path(key)?;
        self.ensure_parent_dir(&final_path).await?;

        let partial_path = partial_path(&final_path);

        let file = fs::File::create(&partial_path).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to create file {}: {}",
                partial_path.display(),
                e
            ))
        })?;

        if options.gzip {
            tracing::debug!(key = %key, "Local bucket stores objects uncompressed");
        }

        Ok(Box::new(LocalObjectWriter {
            file,
            partial_path,
            final_path,
            bytes_written: 0,
            start: std::time::Instant::now(),
        }))
    }

    async fn make_public(&self, key: &StorageKey) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
                .await
                .map_err(|e| StorageError::VisibilityGrant {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
        }

        Ok(())
    }

    async fn delete(&self, key: &StorageKey) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        // An aborted write leaves only the partial file behind.
        let partial_path = partial_path(&path);
        if fs::try_exists(&partial_path).await.unwrap_or(false) {
            fs::remove_file(&partial_path).await.map_err(|e| {
                StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    partial_path.display(),
                    e
                ))
            })?;
        }

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
