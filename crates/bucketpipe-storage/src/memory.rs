use crate::compression::GzipWriter;
use crate::keys::StorageKey;
use crate::traits::{Bucket, ObjectWriter, StorageError, StorageResult, WriteOptions};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};

/// An object held by a [`MemoryBucket`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryObject {
    /// Bytes as written, compressed when `content_encoding` is `gzip`.
    pub data: Bytes,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub public: bool,
}

impl MemoryObject {
    /// Object payload with any gzip content encoding removed.
    pub fn decoded(&self) -> std::io::Result<Vec<u8>> {
        if self.content_encoding.as_deref() == Some("gzip") {
            let mut out = Vec::new();
            GzDecoder::new(&self.data[..]).read_to_end(&mut out)?;
            Ok(out)
        } else {
            Ok(self.data.to_vec())
        }
    }
}

/// In-process bucket for development and tests
///
/// Objects become visible only when their writer finishes. Deleting or
/// publishing a missing key fails with `NotFound`, like the remote store.
#[derive(Clone)]
pub struct MemoryBucket {
    name: String,
    objects: Arc<Mutex<HashMap<String, MemoryObject>>>,
}

impl MemoryBucket {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryBucket {
            name: name.into(),
            objects: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn object(&self, key: &str) -> Option<MemoryObject> {
        self.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemoryObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct MemoryObjectWriter {
    key: String,
    buffer: Vec<u8>,
    content_type: Option<String>,
    content_encoding: Option<String>,
    objects: Arc<Mutex<HashMap<String, MemoryObject>>>,
}

#[async_trait]
impl ObjectWriter for MemoryObjectWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<()> {
        let size = self.buffer.len();
        let object = MemoryObject {
            data: Bytes::from(self.buffer),
            content_type: self.content_type,
            content_encoding: self.content_encoding,
            public: false,
        };
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(self.key.clone(), object);

        tracing::debug!(key = %self.key, size_bytes = size, "Memory object committed");
        Ok(())
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
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

        let writer = Box::new(MemoryObjectWriter {
            key: key.to_string(),
            buffer: Vec::new(),
            content_type: options.content_type.clone(),
            content_encoding: options.gzip.then(|| "gzip".to_string()),
            objects: self.objects.clone(),
        });

        if options.gzip {
            Ok(Box::new(GzipWriter::new(writer)))
        } else {
            Ok(writer)
        }
    }

    async fn make_public(&self, key: &StorageKey) -> StorageResult<()> {
        match self.lock().get_mut(key.as_str()) {
            Some(object) => {
                object.public = true;
                Ok(())
            }
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    async fn delete(&self, key: &StorageKey) -> StorageResult<()> {
        match self.lock().remove(key.as_str()) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn put(bucket: &MemoryBucket, key: &StorageKey, data: &'static [u8], gzip: bool) {
        let options = WriteOptions {
            gzip,
            content_type: Some("text/plain".to_string()),
            ..Default::default()
        };
        let mut writer = bucket.open_write(key, &options).await.unwrap();
        writer.write_chunk(Bytes::from_static(data)).await.unwrap();
        writer.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_object_visible_only_after_finish() {
        let bucket = MemoryBucket::new("test");
        let key = StorageKey::parse("a/b.txt").unwrap();

        let mut writer = bucket
            .open_write(&key, &WriteOptions::default())
            .await
            .unwrap();
        writer.write_chunk(Bytes::from_static(b"abc")).await.unwrap();
        assert!(bucket.object("a/b.txt").is_none());

        writer.finish().await.unwrap();
        let object = bucket.object("a/b.txt").unwrap();
        assert_eq!(object.data, Bytes::from_static(b"abc"));
        assert!(!object.public);
    }

    #[tokio::test]
    async fn test_gzip_objects_decode() {
        let bucket = MemoryBucket::new("test");
        let key = StorageKey::parse("notes.txt").unwrap();
        put(&bucket, &key, b"hello hello hello", true).await;

        let object = bucket.object("notes.txt").unwrap();
        assert_eq!(object.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(object.content_type.as_deref(), Some("text/plain"));
        assert_eq!(object.decoded().unwrap(), b"hello hello hello");
    }

    #[tokio::test]
    async fn test_make_public_and_delete() {
        let bucket = MemoryBucket::new("test");
        let key = StorageKey::parse("x.txt").unwrap();
        put(&bucket, &key, b"x", false).await;

        bucket.make_public(&key).await.unwrap();
        assert!(bucket.object("x.txt").unwrap().public);

        bucket.delete(&key).await.unwrap();
        assert!(bucket.is_empty());

        assert!(matches!(
            bucket.delete(&key).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            bucket.make_public(&key).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resumable_rejected() {
        let bucket = MemoryBucket::new("test");
        let key = StorageKey::parse("x.txt").unwrap();
        let options = WriteOptions {
            resumable: true,
            ..Default::default()
        };
        assert!(matches!(
            bucket.open_write(&key, &options).await,
            Err(StorageError::ConfigError(_))
        ));
    }

    #[test]
    fn test_default_public_url_shape() {
        let bucket = MemoryBucket::new("assets");
        let key = StorageKey::parse("uploads/a.txt").unwrap();
        assert_eq!(
            bucket.public_url(&key),
            "https://storage.googleapis.com/assets/uploads/a.txt"
        );
    }
}
