//! Authentication extractor.
//!
//! Every `/api` route takes [`RequireAuth`]. It reads the `SESSION-TOKEN`
//! cookie and the `X-XSRF-TOKEN` header, verifies them together and loads
//! the employee. Whatever fails, the client gets the same 404 so an
//! unauthenticated caller cannot tell which check rejected it.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{Span, debug};

use super::cookies::{CSRF_HEADER, SESSION_COOKIE, read_cookie};
use crate::db::UserRepository;
use crate::error::set_sentry_user;
use crate::models::CurrentUser;
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

/// Extractor that requires an authenticated employee.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", user.username)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Uniform rejection for unauthenticated requests.
#[derive(Debug)]
pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
    }
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session_token = read_cookie(&parts.headers, SESSION_COOKIE).ok_or(AuthRejection)?;
        let csrf = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthRejection)?;

        let auth = AuthService::new(UserRepository::new(state.pool()), state.tokens());
        let user = auth
            .current_user(&session_token, csrf)
            .await
            .map_err(|e| {
                if let AuthError::Repository(ref err) = e {
                    tracing::error!(error = %err, "Credential lookup failed during authentication");
                } else {
                    debug!(error = %e, "Request not authenticated");
                }
                AuthRejection
            })?;

        Span::current().record("username", user.username.as_str());
        set_sentry_user(&user.username);

        Ok(Self(user))
    }
}
