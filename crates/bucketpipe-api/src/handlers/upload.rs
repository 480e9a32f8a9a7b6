//! Multipart upload endpoint
//!
//! Text fields sent before the file become resolver context. Exactly one file
//! part named `file` is streamed into the bucket; it is never buffered whole.

use crate::error::HttpAppError;
use crate::state::AppState;
use crate::utils::upload::validate_content_type;
use axum::{
    extract::{
        multipart::{Field, MultipartError},
        Multipart, State,
    },
    http::HeaderMap,
    Json,
};
use bucketpipe_core::AppError;
use bucketpipe_storage::{FileInfo, FileRecord, IncomingFile, UploadContext, UploadResult};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::io::StreamReader;

const FILE_FIELD: &str = "file";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub file: UploadedFile,
}

/// File part metadata merged with where it was stored.
#[derive(Debug, Serialize)]
pub struct UploadedFile {
    #[serde(flatten)]
    pub info: FileInfo,
    #[serde(flatten)]
    pub result: UploadResult,
}

struct StoredFile {
    record: FileRecord,
    result: UploadResult,
}

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, HttpAppError> {
    let mut ctx = UploadContext::new().with_headers(headers);
    let mut stored: Option<StoredFile> = None;

    if let Err(err) = receive_parts(&state, &mut ctx, &mut multipart, &mut stored).await {
        // The request failed after a file was stored: undo it.
        if let Some(file) = stored.take() {
            remove_stored(&state, &ctx, &file.record).await;
        }
        return Err(err);
    }

    let StoredFile { record, result } =
        stored.ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        file: UploadedFile {
            info: record.info,
            result,
        },
    }))
}

async fn receive_parts(
    state: &AppState,
    ctx: &mut UploadContext,
    multipart: &mut Multipart,
    stored: &mut Option<StoredFile>,
) -> Result<(), HttpAppError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_none() {
            let value = field.text().await?;
            ctx.fields.insert(name, value);
            continue;
        }

        if name != FILE_FIELD {
            return Err(AppError::InvalidInput(format!(
                "Unexpected file field '{}'; send exactly one field named 'file'",
                name
            ))
            .into());
        }
        if stored.is_some() {
            return Err(AppError::InvalidInput(
                "Multiple file fields are not allowed; send exactly one field named 'file'"
                    .to_string(),
            )
            .into());
        }

        let info = FileInfo::new(
            name,
            field.file_name().unwrap_or("unknown"),
            field.content_type().unwrap_or(DEFAULT_CONTENT_TYPE),
        );
        validate_content_type(&info.content_type, state.config.allowed_content_types())?;

        *stored = Some(store_file(state, ctx, info, field).await?);
    }

    Ok(())
}

async fn store_file(
    state: &AppState,
    ctx: &UploadContext,
    info: FileInfo,
    field: Field<'_>,
) -> Result<StoredFile, HttpAppError> {
    let limit = state.config.max_file_size_bytes() as u64;
    let exceeded = AtomicBool::new(false);
    let body = StreamReader::new(size_limited(field, limit, &exceeded));

    let (record, result) = state
        .engine
        .handle_file(ctx, IncomingFile::new(info, body))
        .await
        .into_parts();

    match result {
        Ok(result) => Ok(StoredFile { record, result }),
        Err(err) => {
            if record.stored_key.is_some() {
                remove_stored(state, ctx, &record).await;
            }
            if exceeded.load(Ordering::SeqCst) {
                return Err(AppError::PayloadTooLarge(format!(
                    "File size exceeds maximum allowed size of {} MB",
                    limit / 1024 / 1024
                ))
                .into());
            }
            Err(err.into())
        }
    }
}

/// Fail the body stream once more than `limit` bytes have been received.
fn size_limited<'a, S>(
    stream: S,
    limit: u64,
    exceeded: &'a AtomicBool,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'a
where
    S: Stream<Item = Result<Bytes, MultipartError>> + Send + 'a,
{
    let mut received: u64 = 0;
    stream.map(move |chunk| {
        let chunk = chunk.map_err(io::Error::other)?;
        received += chunk.len() as u64;
        if received > limit {
            exceeded.store(true, Ordering::SeqCst);
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "file exceeds the maximum upload size",
            ));
        }
        Ok(chunk)
    })
}

/// Best-effort removal; the original failure is what the client sees.
async fn remove_stored(state: &AppState, ctx: &UploadContext, record: &FileRecord) {
    if let Err(err) = state.engine.remove_file(ctx, record).await {
        tracing::debug!(
            error = %err,
            request_id = %ctx.request_id,
            original_name = %record.info.original_name,
            "Failed to remove stored file"
        );
    }
}
