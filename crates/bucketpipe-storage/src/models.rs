//! Upload request, record and result types

use crate::keys::StorageKey;
use crate::traits::StorageResult;
use http::HeaderMap;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-request context handed to resolvers.
#[derive(Debug, Clone, Default)]
pub struct UploadContext {
    pub request_id: Uuid,
    pub headers: HeaderMap,
    /// Non-file form fields received before the file part.
    pub fields: HashMap<String, String>,
    cancel: CancellationToken,
}

impl UploadContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            ..Default::default()
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Use an externally owned token so the host can abort in-flight uploads.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Descriptive metadata of one file part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    #[serde(rename = "fieldname")]
    pub field_name: String,
    #[serde(rename = "originalname")]
    pub original_name: String,
    #[serde(rename = "mimetype")]
    pub content_type: String,
}

impl FileInfo {
    pub fn new(
        field_name: impl Into<String>,
        original_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            original_name: original_name.into(),
            content_type: content_type.into(),
        }
    }
}

/// Upload body reader. Consumed exactly once by `handle_file`.
pub type ByteReader<'a> = Pin<Box<dyn AsyncRead + Send + 'a>>;

/// A file part whose body has not been read yet.
pub struct IncomingFile<'a> {
    pub info: FileInfo,
    pub body: ByteReader<'a>,
}

impl<'a> IncomingFile<'a> {
    pub fn new(info: FileInfo, body: impl AsyncRead + Send + 'a) -> Self {
        Self {
            info,
            body: Box::pin(body),
        }
    }
}

impl fmt::Debug for IncomingFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingFile")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Association between a file part and the key it was stored under.
///
/// Returned by `handle_file` and handed back to `remove_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    #[serde(flatten)]
    pub info: FileInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_key: Option<StorageKey>,
}

impl FileRecord {
    pub fn new(info: FileInfo) -> Self {
        Self {
            info,
            stored_key: None,
        }
    }
}

/// Successful upload payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub bucket: String,
    /// Full storage key of the object.
    pub filename: String,
    pub public_url: String,
    /// Bytes read from the upload (before compression).
    pub size: u64,
}

/// Outcome of one `handle_file` call: a record plus either a result or an error.
#[derive(Debug)]
pub struct UploadOutcome {
    pub record: FileRecord,
    pub result: StorageResult<UploadResult>,
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_parts(self) -> (FileRecord, StorageResult<UploadResult>) {
        (self.record, self.result)
    }
}

/// Steps of a single upload. Terminal states are reported through the
/// outcome, not as phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    ResolvingDestination,
    ResolvingName,
    Streaming,
    Finalizing,
    Removing,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            UploadPhase::ResolvingDestination => "resolving destination",
            UploadPhase::ResolvingName => "resolving name",
            UploadPhase::Streaming => "streaming",
            UploadPhase::Finalizing => "finalizing",
            UploadPhase::Removing => "removing",
        };
        f.write_str(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_host_field_names() {
        let mut record = FileRecord::new(FileInfo::new("file", "a b.txt", "text/plain"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["fieldname"], "file");
        assert_eq!(json["originalname"], "a b.txt");
        assert_eq!(json["mimetype"], "text/plain");
        assert!(json.get("stored_key").is_none());

        record.stored_key = Some(StorageKey::parse("uploads/a b.txt").unwrap());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["stored_key"], "uploads/a b.txt");
    }

    #[test]
    fn test_result_uses_camel_case() {
        let result = UploadResult {
            bucket: "b".to_string(),
            filename: "k".to_string(),
            public_url: "https://storage.googleapis.com/b/k".to_string(),
            size: 1,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["publicUrl"], "https://storage.googleapis.com/b/k");
    }

    #[test]
    fn test_context_fields_and_cancellation() {
        let token = CancellationToken::new();
        let ctx = UploadContext::new()
            .with_field("user", "ada")
            .with_cancellation(token.clone());
        assert_eq!(ctx.field("user"), Some("ada"));
        assert_eq!(ctx.field("missing"), None);

        token.cancel();
        assert!(ctx.cancellation().is_cancelled());
    }
}
