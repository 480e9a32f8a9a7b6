//! Bucketpipe Storage Library
//!
//! A storage engine for multipart upload hosts that streams each file straight
//! into a cloud bucket (Google Cloud Storage / Firebase Storage) instead of
//! buffering it on disk.
//!
//! # Storage key format
//!
//! Keys are `{destination}/{filename}`, both halves produced by pluggable
//! resolvers. An empty destination yields the bare filename. Keys must not
//! contain `..` segments or a leading `/`.
//!
//! # Buckets
//!
//! - [`GcsBucket`] (`storage-gcs`): Google Cloud Storage via `object_store`
//! - [`LocalBucket`] (`storage-local`): local filesystem, for development
//! - [`MemoryBucket`]: in-process, for tests

pub mod compression;
pub mod engine;
pub mod factory;
#[cfg(feature = "storage-gcs")]
pub mod gcs;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
pub mod models;
pub mod resolver;
pub mod traits;

// Re-export commonly used types
pub use bucketpipe_core::StorageBackend;
pub use engine::{BucketStorage, BucketStorageOptions};
pub use factory::{create_bucket, create_engine};
#[cfg(feature = "storage-gcs")]
pub use gcs::GcsBucket;
pub use keys::StorageKey;
#[cfg(feature = "storage-local")]
pub use local::LocalBucket;
pub use memory::{MemoryBucket, MemoryObject};
pub use models::{
    FileInfo, FileRecord, IncomingFile, UploadContext, UploadOutcome, UploadPhase, UploadResult,
};
pub use resolver::{resolver_fn, Resolver};
pub use traits::{
    Bucket, ObjectWriter, ResolverError, ResolverStage, StorageEngine, StorageError,
    StorageErrorKind, StorageResult, WriteOptions,
};
