//! services/api/src/web/middleware.rs
//!
//! Authentication middleware: resolves the identity behind the session cookie.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use intern_tracker_core::domain::Identity;
use std::sync::Arc;
use tracing::{debug, error};

use crate::web::state::AppState;

/// The identity bound to the request, if any. Inserted by [`identify`].
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Option<Identity>);

/// Parses the auth session id out of the `Cookie` header.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

async fn lookup_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, StatusCode> {
    // 1. Parse session ID from cookie
    let auth_session_id = session_cookie(headers).ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Validate auth session in database, get user_id
    let user_id = state
        .db
        .validate_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            debug!("Rejected auth session: {:?}", e);
            StatusCode::UNAUTHORIZED
        })?;

    // 3. Load the identity for the user
    state.db.get_user(user_id).await.map_err(|e| {
        error!("Failed to load user {}: {:?}", user_id, e);
        StatusCode::UNAUTHORIZED
    })
}

/// Middleware that validates the auth session cookie and inserts the `Identity`.
///
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let identity = lookup_identity(&state, req.headers()).await?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Middleware that resolves the identity when there is one, without requiring it.
///
/// Viewer sessions are opened by visitors who are not signed in.
pub async fn identify(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let identity = lookup_identity(&state, req.headers()).await.ok();
    req.extensions_mut().insert(CurrentIdentity(identity));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc-123; lang=en"),
        );
        assert_eq!(session_cookie(&headers), Some("abc-123"));
    }

    #[test]
    fn missing_or_cleared_cookie_is_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_cookie(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_cookie(&headers), None);
    }
}
