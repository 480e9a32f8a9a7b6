//! Bucket-backed storage engine
//!
//! [`BucketStorage`] places each incoming file at `<destination>/<filename>`
//! in a shared bucket, streaming the body straight into the object writer.

use crate::keys::StorageKey;
use crate::models::{
    ByteReader, FileRecord, IncomingFile, UploadContext, UploadOutcome, UploadPhase, UploadResult,
};
use crate::resolver::{Fixed, OriginalName, Resolver};
use crate::traits::{
    Bucket, ResolverStage, StorageEngine, StorageError, StorageResult, WriteOptions,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

/// Bytes read from the upload body per chunk.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Construction options for [`BucketStorage`]
#[derive(Clone)]
pub struct BucketStorageOptions {
    pub bucket: Option<Arc<dyn Bucket>>,
    /// Key prefix resolver. Defaults to the empty prefix.
    pub destination: Option<Arc<dyn Resolver>>,
    /// Object name resolver. Defaults to the original file name.
    pub filename: Option<Arc<dyn Resolver>>,
    pub make_public: bool,
    pub gzip: bool,
    pub upload_timeout: Option<Duration>,
}

impl Default for BucketStorageOptions {
    fn default() -> Self {
        Self {
            bucket: None,
            destination: None,
            filename: None,
            make_public: true,
            gzip: true,
            upload_timeout: None,
        }
    }
}

impl BucketStorageOptions {
    pub fn new(bucket: Arc<dyn Bucket>) -> Self {
        Self {
            bucket: Some(bucket),
            ..Default::default()
        }
    }

    pub fn with_destination(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.destination = Some(resolver);
        self
    }

    pub fn with_filename(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.filename = Some(resolver);
        self
    }

    pub fn with_make_public(mut self, make_public: bool) -> Self {
        self.make_public = make_public;
        self
    }

    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = Some(timeout);
        self
    }
}

/// Storage engine writing uploads into a single bucket
pub struct BucketStorage {
    bucket: Arc<dyn Bucket>,
    destination: Arc<dyn Resolver>,
    filename: Arc<dyn Resolver>,
    make_public: bool,
    gzip: bool,
    upload_timeout: Option<Duration>,
}

impl BucketStorage {
    pub fn new(options: BucketStorageOptions) -> StorageResult<Self> {
        let bucket = options
            .bucket
            .ok_or_else(|| StorageError::ConfigError("bucket is required".to_string()))?;

        Ok(Self {
            bucket,
            destination: options
                .destination
                .unwrap_or_else(|| Arc::new(Fixed::default())),
            filename: options.filename.unwrap_or_else(|| Arc::new(OriginalName)),
            make_public: options.make_public,
            gzip: options.gzip,
            upload_timeout: options.upload_timeout,
        })
    }

    pub fn bucket(&self) -> &Arc<dyn Bucket> {
        &self.bucket
    }

    async fn store(
        &self,
        ctx: &UploadContext,
        record: &mut FileRecord,
        body: ByteReader<'_>,
    ) -> StorageResult<UploadResult> {
        let cancel = ctx.cancellation();

        tracing::debug!(request_id = %ctx.request_id, phase = %UploadPhase::ResolvingDestination, "Upload phase");
        let destination = until_cancelled(
            cancel,
            UploadPhase::ResolvingDestination,
            self.destination.resolve(ctx, &record.info),
        )
        .await?
        .map_err(|source| StorageError::Resolver {
            stage: ResolverStage::Destination,
            source,
        })?;

        tracing::debug!(request_id = %ctx.request_id, phase = %UploadPhase::ResolvingName, "Upload phase");
        let name = until_cancelled(
            cancel,
            UploadPhase::ResolvingName,
            self.filename.resolve(ctx, &record.info),
        )
        .await?
        .map_err(|source| StorageError::Resolver {
            stage: ResolverStage::Filename,
            source,
        })?;

        let key = StorageKey::compose(&destination, &name)?;
        record.stored_key = Some(key.clone());

        tracing::debug!(request_id = %ctx.request_id, key = %key, phase = %UploadPhase::Streaming, "Upload phase");
        let options = WriteOptions {
            resumable: false,
            gzip: self.gzip,
            content_type: Some(record.info.content_type.clone()),
        };
        let mut writer = until_cancelled(
            cancel,
            UploadPhase::Streaming,
            self.bucket.open_write(&key, &options),
        )
        .await??;

        let mut chunks = ReaderStream::with_capacity(body, READ_CHUNK_SIZE);
        let mut size: u64 = 0;
        while let Some(chunk) = until_cancelled(cancel, UploadPhase::Streaming, chunks.next()).await? {
            let chunk = chunk.map_err(StorageError::Stream)?;
            size += chunk.len() as u64;
            until_cancelled(cancel, UploadPhase::Streaming, writer.write_chunk(chunk)).await??;
        }

        tracing::debug!(request_id = %ctx.request_id, key = %key, phase = %UploadPhase::Finalizing, "Upload phase");
        until_cancelled(cancel, UploadPhase::Finalizing, writer.finish()).await??;

        if self.make_public {
            until_cancelled(cancel, UploadPhase::Finalizing, self.bucket.make_public(&key))
                .await?
                .map_err(|e| match e {
                    grant @ StorageError::VisibilityGrant { .. } => grant,
                    other => StorageError::VisibilityGrant {
                        key: key.to_string(),
                        reason: other.to_string(),
                    },
                })?;
        }

        Ok(UploadResult {
            bucket: self.bucket.name().to_string(),
            public_url: self.bucket.public_url(&key),
            filename: key.into_string(),
            size,
        })
    }
}

/// Race `fut` against the request's cancellation token.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    phase: UploadPhase,
    fut: impl Future<Output = T>,
) -> StorageResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled(phase)),
        value = fut => Ok(value),
    }
}

#[async_trait]
impl StorageEngine for BucketStorage {
    async fn handle_file(&self, ctx: &UploadContext, file: IncomingFile<'_>) -> UploadOutcome {
        let start = Instant::now();
        let IncomingFile { info, body } = file;
        let mut record = FileRecord::new(info);

        let result = match self.upload_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.store(ctx, &mut record, body)).await {
                    Ok(result) => result,
                    Err(_) => Err(StorageError::TimedOut(limit)),
                }
            }
            None => self.store(ctx, &mut record, body).await,
        };

        let key = record.stored_key.as_ref().map(|k| k.as_str()).unwrap_or("");
        match &result {
            Ok(uploaded) => tracing::info!(
                request_id = %ctx.request_id,
                bucket = %uploaded.bucket,
                key = %uploaded.filename,
                size_bytes = uploaded.size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "File stored"
            ),
            Err(e) => tracing::error!(
                request_id = %ctx.request_id,
                error = %e,
                bucket = %self.bucket.name(),
                key = %key,
                original_name = %record.info.original_name,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "File storage failed"
            ),
        }

        UploadOutcome { record, result }
    }

    async fn remove_file(&self, ctx: &UploadContext, record: &FileRecord) -> StorageResult<()> {
        let key = record
            .stored_key
            .as_ref()
            .ok_or_else(|| StorageError::MissingReference(record.info.original_name.clone()))?;

        let start = Instant::now();
        until_cancelled(
            ctx.cancellation(),
            UploadPhase::Removing,
            self.bucket.delete(key),
        )
        .await??;

        tracing::info!(
            request_id = %ctx.request_id,
            bucket = %self.bucket.name(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "File removed"
        );

        Ok(())
    }
}
