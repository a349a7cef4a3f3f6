use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::error::ServerError;
use crate::state::AppState;

/// Middleware that checks `Authorization: Bearer <admin_token>`
///
/// Passes everything through when no token is configured.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    if let Some(expected) = state.config.admin_token.as_deref() {
        let presented = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ServerError::Unauthorized("Missing bearer token".into()))?;

        if presented != expected {
            return Err(ServerError::Unauthorized("Invalid bearer token".into()));
        }
    }

    Ok(next.run(request).await)
}
