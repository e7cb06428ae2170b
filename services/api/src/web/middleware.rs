//! services/api/src/web/middleware.rs
//!
//! Identity middleware for protecting routes.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

/// The header carrying the caller's id, set by the gateway in front of the service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Middleware that reads the caller's id from the `x-user-id` header.
///
/// If valid, inserts the user id into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user_id = user_id_from_headers(req.headers()).ok_or_else(|| {
        warn!("Rejected {} {}: missing or invalid {}", req.method(), req.uri().path(), USER_ID_HEADER);
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

fn user_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    let raw = headers.get(USER_ID_HEADER)?.to_str().ok()?;
    Uuid::parse_str(raw.trim()).ok()
}
