//! Staff authentication route handlers.
//!
//! Login sets two cookies: the `HttpOnly` session token and the readable
//! CSRF value. Every later request presents the session cookie together
//! with the CSRF value copied into the `X-XSRF-TOKEN` header.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::db::UserRepository;
use crate::error::{AppError, Result};
use crate::middleware::cookies::{expired_cookies, session_cookies};
use crate::middleware::{CSRF_HEADER, RequireAuth, SESSION_COOKIE, read_cookie};
use crate::models::{BusinessInfo, CurrentUser};
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response body. The tokens travel in cookies only.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub redirect_path: &'static str,
    pub currency: String,
    pub business_info: BusinessInfo,
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /auth/login`
#[instrument(skip(state, request), fields(username = %request.username))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let config = state.config();
    let ttl = chrono::Duration::from_std(config.auth.session_ttl)
        .map_err(|e| AppError::Internal(format!("session ttl out of range: {e}")))?;

    let auth = AuthService::new(UserRepository::new(state.pool()), state.tokens());
    let session = auth.login(&request.username, &request.password, ttl).await?;

    let [session_cookie, csrf_cookie] = session_cookies(
        &session.session_token,
        &session.csrf_token,
        session.expires_at,
        config.auth.cookie_secure,
    );

    info!("Employee logged in");

    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie), (SET_COOKIE, csrf_cookie)]),
        Json(LoginResponse {
            redirect_path: session.redirect_path,
            currency: session.currency,
            business_info: session.business_info,
        }),
    ))
}

/// `PUT /auth/validate`
///
/// Answers `valid` or a uniform 401 without saying which check failed.
pub async fn validate(State(state): State<AppState>, headers: HeaderMap) -> Result<&'static str> {
    let session_token = read_cookie(&headers, SESSION_COOKIE).ok_or(AuthError::NotValidated)?;
    let csrf = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::NotValidated)?;

    AuthService::new(UserRepository::new(state.pool()), state.tokens())
        .validate(&session_token, csrf)?;
    Ok("valid")
}

/// `POST /auth/logout`
///
/// Tokens are stateless, so logging out means overwriting both cookies
/// with already-expired ones.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let [session_cookie, csrf_cookie] =
        expired_cookies(Utc::now(), state.config().auth.cookie_secure);
    (
        AppendHeaders([(SET_COOKIE, session_cookie), (SET_COOKIE, csrf_cookie)]),
        "logged out",
    )
}

/// `GET /api/me`
pub async fn me(RequireAuth(user): RequireAuth) -> Json<CurrentUser> {
    Json(user)
}
