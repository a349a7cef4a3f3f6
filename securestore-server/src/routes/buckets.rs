use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::error::{ServerError, ServerResult};
use crate::ident;
use crate::state::AppState;

#[derive(Serialize)]
pub struct BucketList {
    pub buckets: Vec<String>,
}

pub(crate) fn check_bucket_id(bucket: &str) -> ServerResult<()> {
    if !ident::is_valid(bucket) {
        return Err(ServerError::BadRequest(
            "bucket id doesn't match the required pattern".into(),
        ));
    }
    Ok(())
}

/// POST /buckets/{bucket}
pub async fn create_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> ServerResult<StatusCode> {
    check_bucket_id(&bucket)?;
    state.objects.new_bucket(&bucket).await?;
    Ok(StatusCode::CREATED)
}

/// GET /buckets
pub async fn list_buckets(State(state): State<AppState>) -> ServerResult<Json<BucketList>> {
    let buckets = state.objects.list_buckets().await?;
    Ok(Json(BucketList { buckets }))
}

/// DELETE /buckets/{bucket}
pub async fn delete_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> ServerResult<StatusCode> {
    check_bucket_id(&bucket)?;
    state.objects.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}
