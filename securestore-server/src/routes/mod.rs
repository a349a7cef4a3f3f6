use crate::middleware::require_admin;
use crate::state::AppState;
use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

mod buckets;
mod download;
mod health;
mod keys;
mod objects;

pub fn router(state: AppState) -> Router {
    let management = Router::new()
        .route("/buckets", get(buckets::list_buckets))
        .route(
            "/buckets/{bucket}",
            post(buckets::create_bucket).delete(buckets::delete_bucket),
        )
        .route(
            "/buckets/{bucket}/objects/{object}",
            get(objects::download_object)
                .put(objects::upload_object)
                .delete(objects::delete_object),
        )
        .route("/api/keys", post(keys::add_key))
        .route("/api/keys/{url_key}", delete(keys::delete_key))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    let public = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/download", get(download::download));

    Router::new()
        .merge(management)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
