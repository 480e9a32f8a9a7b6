use crate::compression::GzipWriter;
use crate::keys::StorageKey;
use crate::traits::{
    Bucket, ObjectWriter, StorageError, StorageResult, WriteOptions, DEFAULT_PUBLIC_HOST,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::buffered::BufWriter;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStoreExt, Result as ObjectResult,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

const JSON_API_BASE: &str = "https://storage.googleapis.com/storage/v1";

/// Characters left unescaped in a JSON API path segment.
const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Google Cloud Storage (and Firebase Storage) bucket
///
/// Writes stream through `object_store`'s buffered writer, which commits the
/// object on finish. Public access is granted with an `allUsers:READER` ACL
/// entry through the JSON API, authenticated with the store's own credentials.
#[derive(Clone)]
pub struct GcsBucket {
    store: Arc<GoogleCloudStorage>,
    bucket: String,
    public_host: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ObjectAccessControl {
    entity: &'static str,
    role: &'static str,
}

impl GcsBucket {
    /// Create a new GcsBucket instance
    ///
    /// # Arguments
    /// * `bucket` - Bucket name (for Firebase, `<project>.appspot.com`)
    /// * `service_account_path` - Optional service account JSON; ambient
    ///   credentials from the environment are used when `None`
    /// * `public_host` - Host used in public URLs, defaults to `storage.googleapis.com`
    pub fn new(
        bucket: String,
        service_account_path: Option<String>,
        public_host: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket.clone());

        if let Some(ref path) = service_account_path {
            builder = builder.with_service_account_path(path.clone());
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self::from_store(
            store,
            bucket,
            public_host.unwrap_or_else(|| DEFAULT_PUBLIC_HOST.to_string()),
            JSON_API_BASE.to_string(),
        ))
    }

    fn from_store(
        store: GoogleCloudStorage,
        bucket: String,
        public_host: String,
        api_base: String,
    ) -> Self {
        GcsBucket {
            store: Arc::new(store),
            bucket,
            public_host,
            api_base,
            http: reqwest::Client::new(),
        }
    }

    /// Object name for `key`. Must equal the key's text exactly; `Path::from`
    /// percent-encodes characters such as `#` and `%`, `Path::parse` does not.
    fn object_path(key: &StorageKey) -> StorageResult<Path> {
        let path = Path::parse(key.as_str())
            .map_err(|e| StorageError::InvalidKey(e.to_string()))?;
        if path.as_ref() != key.as_str() {
            return Err(StorageError::InvalidKey(format!(
                "Storage key is not a valid object name: {}",
                key
            )));
        }
        Ok(path)
    }

    fn acl_url(&self, object: &Path) -> String {
        format!(
            "{}/b/{}/o/{}/acl",
            self.api_base,
            utf8_percent_encode(&self.bucket, OBJECT_NAME),
            utf8_percent_encode(object.as_ref(), OBJECT_NAME)
        )
    }

    fn write_attributes(options: &WriteOptions) -> Attributes {
        let mut attributes = Attributes::new();
        if let Some(ref content_type) = options.content_type {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.clone()),
            );
        }
        if options.gzip {
            attributes.insert(Attribute::ContentEncoding, AttributeValue::from("gzip"));
        }
        attributes
    }
}

struct GcsObjectWriter {
    writer: BufWriter,
    bucket: String,
    key: String,
    bytes_written: u64,
    start: std::time::Instant,
}

#[async_trait]
impl ObjectWriter for GcsObjectWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.writer.write_all(&chunk).await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %self.key,
                size_bytes = self.bytes_written,
                duration_ms = self.start.elapsed().as_secs_f64() * 1000.0,
                "GCS stream write failed"
            );
            StorageError::Stream(e)
        })?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<()> {
        let mut this = *self;
        this.writer.shutdown().await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %this.bucket,
                key = %this.key,
                size_bytes = this.bytes_written,
                duration_ms = this.start.elapsed().as_secs_f64() * 1000.0,
                "GCS upload failed"
            );
            StorageError::Stream(e)
        })?;

        tracing::info!(
            bucket = %this.bucket,
            key = %this.key,
            size_bytes = this.bytes_written,
            duration_ms = this.start.elapsed().as_secs_f64() * 1000.0,
            "GCS upload successful"
        );

        Ok(())
    }
}

#[async_trait]
impl Bucket for GcsBucket {
    fn name(&self) -> &str {
        &self.bucket
    }

    fn public_url(&self, key: &StorageKey) -> String {
        format!("https://{}/{}/{}", self.public_host, self.bucket, key)
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

        let location = Self::object_path(key)?;
        let store: Arc<dyn object_store::ObjectStore> = self.store.clone();
        let writer = BufWriter::new(store, location).with_attributes(Self::write_attributes(options));

        let writer: Box<dyn ObjectWriter> = Box::new(GcsObjectWriter {
            writer,
            bucket: self.bucket.clone(),
            key: key.to_string(),
            bytes_written: 0,
            start: std::time::Instant::now(),
        });

        if options.gzip {
            Ok(Box::new(GzipWriter::new(writer)))
        } else {
            Ok(writer)
        }
    }

    async fn make_public(&self, key: &StorageKey) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let location = Self::object_path(key)?;
        let grant_error = |reason: String| StorageError::VisibilityGrant {
            key: key.to_string(),
            reason,
        };

        let credential = self
            .store
            .credentials()
            .get_credential()
            .await
            .map_err(|e| grant_error(e.to_string()))?;

        let response = self
            .http
            .post(self.acl_url(&location))
            .bearer_auth(&credential.bearer)
            .json(&ObjectAccessControl {
                entity: "allUsers",
                role: "READER",
            })
            .send()
            .await
            .map_err(|e| grant_error(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                bucket = %self.bucket,
                key = %key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "GCS make public failed"
            );
            return Err(grant_error(format!("{}: {}", status, body)));
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GCS object made public"
        );

        Ok(())
    }

    async fn delete(&self, key: &StorageKey) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let location = Self::object_path(key)?;

        let result: ObjectResult<_> = self.store.delete(&location).await;

        result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "GCS delete failed"
                );
                StorageError::DeleteFailed(other.to_string())
            }
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GCS delete successful"
        );

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Gcs
    }
}
