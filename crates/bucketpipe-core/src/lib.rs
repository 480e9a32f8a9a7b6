//! Bucketpipe Core Library
//!
//! This crate provides the configuration, error taxonomy and storage backend
//! types shared by the storage adapter and the host service.

pub mod config;
pub mod error;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, FilenameStrategy, StorageConfig, UploadConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
