//! Bucketpipe API Library
//!
//! HTTP host for the bucket storage engine: a multipart upload endpoint, a
//! health probe and application setup.

pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;
mod telemetry;
mod utils;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
