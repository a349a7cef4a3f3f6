use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
};
use securestore_access::{CapabilityKey, ExternalCapabilityKey};

use crate::error::{ServerError, ServerResult};
use crate::ident;
use crate::state::AppState;

fn check_key_ids(key: &CapabilityKey) -> ServerResult<()> {
    for (what, id) in [
        ("bucket id", &key.bucket_id),
        ("key id", &key.object_id),
        ("url key", &key.url_key),
    ] {
        if !ident::is_valid(id) {
            return Err(ServerError::BadRequest(format!(
                "{what} doesn't match the required pattern"
            )));
        }
    }
    Ok(())
}

/// POST /api/keys
/// Body is an `ExternalCapabilityKey`; replies with the key as stored
pub async fn add_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ServerResult<(StatusCode, Json<ExternalCapabilityKey>)> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    if mime != "application/json" {
        return Err(ServerError::UnsupportedMediaType(
            "Content-Type must be application/json".into(),
        ));
    }

    let key = ExternalCapabilityKey::parse(&body)?;
    check_key_ids(&key)?;

    let reply = ExternalCapabilityKey::from(&key);
    state.keys.add_key(key).await?;
    tracing::debug!(url_key = %reply.url_key, "access key was set");
    Ok((StatusCode::CREATED, Json(reply)))
}

/// DELETE /api/keys/{url_key}
pub async fn delete_key(
    State(state): State<AppState>,
    Path(url_key): Path<String>,
) -> ServerResult<StatusCode> {
    if !ident::is_valid(&url_key) {
        return Err(ServerError::BadRequest(
            "url key doesn't match the required pattern".into(),
        ));
    }
    state.keys.delete_url_key(&url_key).await?;
    Ok(StatusCode::NO_CONTENT)
}
