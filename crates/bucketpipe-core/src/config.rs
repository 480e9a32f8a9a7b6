//! Configuration module
//!
//! This module provides the configuration structures for the host service and
//! the storage adapter: server settings, bucket selection and per-upload policy.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::storage_types::StorageBackend;

// Common constants
const SERVER_PORT: u16 = 4000;
const MAX_FILE_SIZE_MB: usize = 1000;
const GCS_PUBLIC_HOST: &str = "storage.googleapis.com";
const MEMORY_BUCKET_NAME: &str = "memory";

/// Base configuration for the HTTP host
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub environment: String,
}

/// Bucket selection and backend-specific settings
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub gcs_bucket: Option<String>,
    /// Path to a service account JSON file. When unset, ambient credentials are used.
    pub gcs_service_account: Option<String>,
    pub gcs_public_host: String,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub memory_bucket_name: String,
}

/// How the filename half of a storage key is produced
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilenameStrategy {
    /// Keep the client-supplied file name.
    Original,
    /// `<unix millis>_<original name with spaces replaced by underscores>`
    Timestamped,
    /// `<uuid v4>.<original extension>`
    Uuid,
}

impl FromStr for FilenameStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "original" => Ok(FilenameStrategy::Original),
            "timestamped" | "timestamp" => Ok(FilenameStrategy::Timestamped),
            "uuid" => Ok(FilenameStrategy::Uuid),
            _ => Err(anyhow::anyhow!("Invalid filename strategy: {}", s)),
        }
    }
}

/// Per-upload policy applied by the storage adapter and the host
#[derive(Clone, Debug)]
pub struct UploadConfig {
    /// Fixed directory prefix for every stored object. Empty means bucket root.
    pub destination: String,
    pub filename_strategy: FilenameStrategy,
    pub make_public: bool,
    pub gzip: bool,
    /// Overall deadline for one file, `None` when unbounded.
    pub timeout: Option<Duration>,
    pub max_file_size_bytes: usize,
    /// Lowercased MIME allowlist. Empty allows every type.
    pub allowed_content_types: Vec<String>,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.base.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    /// Load configuration from the process environment (and `.env` when present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = Self::from_vars(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// Does not validate; call [`Config::validate`] before use.
    pub fn from_vars<F>(var: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = var("ENVIRONMENT")
            .or_else(|| var("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let base = BaseConfig {
            server_port: var("PORT")
                .unwrap_or_else(|| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
        };

        let storage = StorageConfig {
            backend: var("STORAGE_BACKEND")
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or(StorageBackend::Gcs),
            gcs_bucket: var("GCS_BUCKET").filter(|s| !s.is_empty()),
            gcs_service_account: var("GOOGLE_SERVICE_ACCOUNT").filter(|s| !s.is_empty()),
            gcs_public_host: var("GCS_PUBLIC_HOST")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| GCS_PUBLIC_HOST.to_string()),
            local_storage_path: var("LOCAL_STORAGE_PATH").filter(|s| !s.is_empty()),
            local_storage_base_url: var("LOCAL_STORAGE_BASE_URL").filter(|s| !s.is_empty()),
            memory_bucket_name: var("MEMORY_BUCKET_NAME")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| MEMORY_BUCKET_NAME.to_string()),
        };

        let max_file_size_mb = var("MAX_FILE_SIZE_MB")
            .unwrap_or_else(|| MAX_FILE_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_FILE_SIZE_MB);
        let max_file_size_bytes = max_file_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow::anyhow!("MAX_FILE_SIZE_MB is too large: {}", max_file_size_mb))?;

        let allowed_content_types = var("ALLOWED_CONTENT_TYPES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let timeout_secs = var("UPLOAD_TIMEOUT_SECS")
            .unwrap_or_else(|| "0".to_string())
            .parse::<u64>()
            .unwrap_or(0);

        let upload = UploadConfig {
            destination: var("UPLOAD_DESTINATION").unwrap_or_default(),
            filename_strategy: var("UPLOAD_FILENAME_STRATEGY")
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or(FilenameStrategy::Original),
            make_public: parse_flag("UPLOAD_MAKE_PUBLIC", var("UPLOAD_MAKE_PUBLIC"), true)?,
            gzip: parse_flag("UPLOAD_GZIP", var("UPLOAD_GZIP"), true)?,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            max_file_size_bytes,
            allowed_content_types,
        };

        Ok(Config {
            base,
            storage,
            upload,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage.backend {
            StorageBackend::Gcs => {
                if self.storage.gcs_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "GCS_BUCKET must be set when using the gcs storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.storage.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {
                if self.is_production() {
                    return Err(anyhow::anyhow!(
                        "The memory storage backend cannot be used in production"
                    ));
                }
            }
        }

        if self.upload.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }

        Ok(())
    }

    // Convenience getters for common fields
    pub fn server_port(&self) -> u16 {
        self.base.server_port
    }

    pub fn environment(&self) -> &str {
        &self.base.environment
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage.backend
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.upload.max_file_size_bytes
    }

    pub fn allowed_content_types(&self) -> &[String] {
        &self.upload.allowed_content_types
    }
}

/// Parse a boolean setting, accepting `true`/`false` in any case.
fn parse_flag(name: &str, value: Option<String>, default: bool) -> Result<bool, anyhow::Error> {
    match value {
        None => Ok(default),
        Some(value) => value.trim().to_lowercase().parse().map_err(|_| {
            anyhow::anyhow!("{} must be true or false, got {:?}", name, value)
        }),
    }
}
