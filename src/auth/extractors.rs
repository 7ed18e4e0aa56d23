use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};

use crate::auth::repo_types::User;
use crate::state::AppState;

/// Name of the cookie carrying the opaque session id.
pub const SESSION_COOKIE: &str = "session_id";

/// Resolves the session cookie to its user, rejecting with 403 when there is
/// no cookie or it no longer maps to an active session.
pub struct SessionUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session_id = parts
            .headers
            .get(header::COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(session_cookie);

        match state.auth.user_from_session_id(session_id.as_deref()).await {
            Some(user) => Ok(SessionUser(user)),
            None => Err((StatusCode::FORBIDDEN, "no active session".into())),
        }
    }
}

/// Pull the session id out of a `Cookie` header value.
fn session_cookie(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}
