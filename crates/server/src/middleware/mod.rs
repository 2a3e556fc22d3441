//! HTTP middleware for the POS API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span with `request_id` and `username` fields)
//! 3. Request ID (fills `request_id`, echoes `x-request-id`)
//! 4. CORS (frontend origin, credentials, `X-XSRF-TOKEN`)
//! 5. Login rate limiting (governor), on `POST /auth/login` only
//!
//! Authentication is an extractor, [`RequireAuth`], taken by every `/api`
//! handler.

pub mod auth;
pub mod cookies;
pub mod rate_limit;
pub mod request_id;

pub use auth::{AuthRejection, RequireAuth};
pub use cookies::{CSRF_COOKIE, CSRF_HEADER, SESSION_COOKIE, read_cookie};
pub use rate_limit::login_rate_limiter;
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
