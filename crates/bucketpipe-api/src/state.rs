//! Application state shared by every handler.

use bucketpipe_core::Config;
use bucketpipe_storage::{Bucket, StorageEngine};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Bucket the engine writes into, kept for health reporting.
    pub bucket: Arc<dyn Bucket>,
    pub engine: Arc<dyn StorageEngine>,
}

impl AppState {
    pub fn new(config: Config, bucket: Arc<dyn Bucket>, engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            config,
            bucket,
            engine,
        }
    }
}
