use std::io;

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use futures::TryStreamExt;
use securestore_storage::{EncryptionKey, Metadata};
use serde::Serialize;
use tokio_util::io::{ReaderStream, StreamReader};

use super::buckets::check_bucket_id;
use crate::error::{ServerError, ServerResult};
use crate::ident;
use crate::state::AppState;

/// Request header carrying the original file name of an upload
pub const FILENAME_HEADER: &str = "filename";

#[derive(Serialize)]
pub struct UploadResponse {
    pub bucket: String,
    pub object: String,
    pub length: u64,
}

fn check_ids(bucket: &str, object: &str) -> ServerResult<()> {
    check_bucket_id(bucket)?;
    if !ident::is_valid(object) {
        return Err(ServerError::BadRequest(
            "object id doesn't match the required pattern".into(),
        ));
    }
    Ok(())
}

/// Response for a decrypted object; `body` must yield exactly `metadata.length` bytes
pub(crate) fn object_response(metadata: &Metadata, body: Body) -> ServerResult<Response> {
    let filename = metadata.filename.replace(['"', '\\', '\r', '\n'], "_");
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, metadata.length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(body)
        .map_err(|e| ServerError::Internal(e.to_string()))
}

/// PUT /buckets/{bucket}/objects/{object}
/// Body is the plaintext, encrypted under a fresh key as it streams in
pub async fn upload_object(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> ServerResult<(StatusCode, Json<UploadResponse>)> {
    check_ids(&bucket, &object)?;

    let filename = headers
        .get(FILENAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::BadRequest("Missing filename header".into()))?;
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let data = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    let length = state
        .objects
        .write(
            &bucket,
            &object,
            &Metadata::new(declared, filename),
            &EncryptionKey::generate(),
            data,
        )
        .await?;

    tracing::debug!(bucket = %bucket, object = %object, length, "uploaded object");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            bucket,
            object,
            length,
        }),
    ))
}

/// GET /buckets/{bucket}/objects/{object}
pub async fn download_object(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
) -> ServerResult<Response> {
    check_ids(&bucket, &object)?;
    let (metadata, reader) = state.objects.read(&bucket, &object).await?;
    object_response(&metadata, Body::from_stream(ReaderStream::new(reader)))
}

/// DELETE /buckets/{bucket}/objects/{object}
pub async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    check_ids(&bucket, &object)?;
    state.objects.delete(&bucket, &object).await?;
    Ok(StatusCode::NO_CONTENT)
}
