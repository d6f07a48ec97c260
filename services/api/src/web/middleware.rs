//! services/api/src/web/middleware.rs
//!
//! Request-identity middleware for the protected routes.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::warn;
use uuid::Uuid;

/// Header carrying the caller's user id. Authentication happens upstream.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Middleware that parses the `x-user-id` header and inserts the user id into the
/// request extensions for handlers to use.
///
/// A missing header is 401, a malformed one 400.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let raw = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
        warn!("Rejected malformed {} header", USER_ID_HEADER);
        StatusCode::BAD_REQUEST
    })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
