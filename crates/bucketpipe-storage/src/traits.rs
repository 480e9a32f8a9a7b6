//! Storage abstraction traits
//!
//! This module defines the bucket capability the adapter writes through, the
//! streaming writer it returns, and the two-operation storage engine contract
//! exposed to the upload host.

use crate::keys::StorageKey;
use crate::models::{FileRecord, IncomingFile, UploadContext, UploadOutcome, UploadPhase};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Host used in public object URLs unless a bucket overrides it.
pub const DEFAULT_PUBLIC_HOST: &str = "storage.googleapis.com";

/// Error returned by a destination or filename resolver.
pub type ResolverError = Box<dyn std::error::Error + Send + Sync>;

/// Which resolver produced a [`StorageError::Resolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverStage {
    Destination,
    Filename,
}

impl std::fmt::Display for ResolverStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolverStage::Destination => write!(f, "destination"),
            ResolverStage::Filename => write!(f, "filename"),
        }
    }
}

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{stage} resolver failed: {source}")]
    Resolver {
        stage: ResolverStage,
        #[source]
        source: ResolverError,
    },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Stream failed: {0}")]
    Stream(#[source] std::io::Error),

    #[error("Failed to make {key} public: {reason}")]
    VisibilityGrant { key: String, reason: String },

    #[error("File path not available for {0}")]
    MissingReference(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Cancelled while {0}")]
    Cancelled(UploadPhase),

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Stream(err)
    }
}

/// Coarse classification of a [`StorageError`], for hosts that branch on the
/// failure class rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    Resolver,
    Stream,
    VisibilityGrant,
    MissingReference,
    RemoteDelete,
    Cancelled,
    TimedOut,
    Config,
    Backend,
}

impl StorageError {
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::Resolver { .. } | StorageError::InvalidKey(_) => {
                StorageErrorKind::Resolver
            }
            StorageError::UploadFailed(_) | StorageError::Stream(_) => StorageErrorKind::Stream,
            StorageError::VisibilityGrant { .. } => StorageErrorKind::VisibilityGrant,
            StorageError::MissingReference(_) => StorageErrorKind::MissingReference,
            StorageError::DeleteFailed(_) | StorageError::NotFound(_) => {
                StorageErrorKind::RemoteDelete
            }
            StorageError::Cancelled(_) => StorageErrorKind::Cancelled,
            StorageError::TimedOut(_) => StorageErrorKind::TimedOut,
            StorageError::ConfigError(_) => StorageErrorKind::Config,
            StorageError::BackendError(_) => StorageErrorKind::Backend,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Options for opening an object write stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Resumable sessions are not supported by any bucket in this crate;
    /// buckets reject `true` with a `ConfigError`.
    pub resumable: bool,
    /// Gzip the payload while streaming and tag it `Content-Encoding: gzip`.
    pub gzip: bool,
    pub content_type: Option<String>,
}

/// A streaming write into one object.
///
/// Each `write_chunk` is awaited before the next chunk is read from the
/// upload, so the writer's own buffering governs flow. `finish` commits the
/// object; dropping the writer without finishing abandons it.
#[async_trait]
pub trait ObjectWriter: Send {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()>;

    async fn finish(self: Box<Self>) -> StorageResult<()>;
}

/// Remote bucket capability
///
/// One long-lived handle per adapter, shared read-only by every upload and
/// deletion. Implementations own connection, auth and ACL mechanics.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Bucket name as it appears in public URLs and upload results.
    fn name(&self) -> &str;

    /// Publicly reachable URL for an object.
    ///
    /// The `https://<host>/<bucket>/<key>` shape is relied on by callers
    /// parsing it and must stay stable.
    fn public_url(&self, key: &StorageKey) -> String {
        format!("https://{}/{}/{}", DEFAULT_PUBLIC_HOST, self.name(), key)
    }

    /// Open a non-buffering write stream to `key`.
    async fn open_write(
        &self,
        key: &StorageKey,
        options: &WriteOptions,
    ) -> StorageResult<Box<dyn ObjectWriter>>;

    /// Grant anonymous read access to an existing object.
    async fn make_public(&self, key: &StorageKey) -> StorageResult<()>;

    /// Delete an object. Whether a missing key is an error is backend-defined.
    async fn delete(&self, key: &StorageKey) -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

/// Storage engine contract consumed by the upload host
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Persist one incoming file.
    ///
    /// Always returns exactly one outcome. The outcome's record carries the
    /// storage key once it has been resolved, even when the upload failed.
    async fn handle_file(&self, ctx: &UploadContext, file: IncomingFile<'_>) -> UploadOutcome;

    /// Delete a previously stored file using the key in its record.
    async fn remove_file(&self, ctx: &UploadContext, record: &FileRecord) -> StorageResult<()>;
}
