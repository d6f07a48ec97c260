pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_user;
pub use state::AppState;

/// Builds the API router. Every route except `/health` requires an `x-user-id` header.
pub fn router(app_state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/health", get(rest::health_handler));

    let protected_routes = Router::new()
        .route(
            "/documents/{document_id}/chapters",
            post(rest::ingest_chapters_handler).get(rest::list_chapters_handler),
        )
        .route(
            "/documents/{document_id}/progress",
            post(rest::track_progress_handler).get(rest::get_progress_handler),
        )
        .route(
            "/documents/{document_id}/progress/chapters",
            get(rest::list_chapter_progress_handler),
        )
        .route(
            "/documents/{document_id}/session/start",
            post(rest::start_session_handler),
        )
        .route(
            "/documents/{document_id}/session/end",
            post(rest::end_session_handler),
        )
        .route("/progress", get(rest::list_progress_handler))
        .layer(axum_middleware::from_fn(require_user));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
