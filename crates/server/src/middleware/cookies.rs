//! Auth cookie names and `Set-Cookie` values.
//!
//! Two cookies carry a session: `SESSION-TOKEN` holds the signed token and
//! is `HttpOnly`; `X-XSRF-TOKEN` holds the CSRF value so frontend script can
//! echo it back in the `X-XSRF-TOKEN` header. Both are built and parsed with
//! the `cookie` crate.

use axum::http::{HeaderMap, header::COOKIE};
use chrono::{DateTime, Duration, Utc};
use cookie::time::OffsetDateTime;
use cookie::{Cookie, SameSite};

/// Cookie holding the signed session token.
pub const SESSION_COOKIE: &str = "SESSION-TOKEN";

/// Cookie holding the CSRF value readable by the frontend.
pub const CSRF_COOKIE: &str = "X-XSRF-TOKEN";

/// Request header the frontend echoes the CSRF value in.
///
/// Same name as [`CSRF_COOKIE`]; the frontend copies the cookie into the
/// header of the same name.
pub const CSRF_HEADER: &str = CSRF_COOKIE;

/// Find a cookie value in the request's `Cookie` headers.
///
/// Values wrapped in double quotes are returned without them.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value_trimmed().to_owned())
}

fn to_offset(at: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// An auth cookie expiring at `expires`.
#[must_use]
pub fn auth_cookie(
    name: &'static str,
    value: &str,
    expires: DateTime<Utc>,
    http_only: bool,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value.to_owned()))
        .path("/")
        .expires(to_offset(expires))
        .same_site(SameSite::Strict)
        .http_only(http_only)
        .secure(secure)
        .build()
}

/// `Set-Cookie` values for the pair of cookies issued on login.
#[must_use]
pub fn session_cookies(
    session_token: &str,
    csrf_token: &str,
    expires: DateTime<Utc>,
    secure: bool,
) -> [String; 2] {
    [
        auth_cookie(SESSION_COOKIE, session_token, expires, true, secure).to_string(),
        auth_cookie(CSRF_COOKIE, csrf_token, expires, false, secure).to_string(),
    ]
}

/// Both auth cookies, emptied and expired an hour ago.
#[must_use]
pub fn expired_cookies(now: DateTime<Utc>, secure: bool) -> [String; 2] {
    session_cookies("", "", now - Duration::hours(1), secure)
}
