//! HTTP route handlers for the POS API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                - Liveness
//! GET  /health/ready                          - Readiness (database)
//!
//! # Auth (cookies + X-XSRF-TOKEN)
//! POST /auth/login                            - Log in, set session and CSRF cookies
//! PUT  /auth/validate                         - Check the current session
//! POST /auth/logout                           - Expire both cookies
//! GET  /api/me                                - Current employee
//!
//! # Orders
//! GET    /api/order                           - List (status, from, to, id, limit, offset)
//! POST   /api/order                           - Create an OPEN order
//! PUT    /api/order/{id}                      - Modify lines and tip
//! GET    /api/order/{id}/items                - Lines with product and variations
//! POST   /api/order/{id}/refund               - Request a refund
//! DELETE /api/order/{id}/refund               - Withdraw the request
//!
//! # Reservations
//! GET    /api/reservation                     - List (status, from, to, search)
//! POST   /api/reservation                     - Book
//! GET    /api/reservation/counts              - Per-status counts
//! GET    /api/reservation/services            - Bookable services
//! GET    /api/reservation/staff               - Bookable staff, led by "anyone"
//! GET    /api/reservation/{id}                - Detail
//! PUT    /api/reservation/{id}                - Partial update
//! POST   /api/reservation/{id}/refund         - Request a refund
//! DELETE /api/reservation/{id}/refund         - Withdraw the request
//!
//! # Refunds
//! GET  /api/refund                            - Open refund requests
//! POST /api/refund/{id}/action                - Approve or disapprove
//!
//! # Stripe
//! POST /api/payment/stripe/create-checkout-session
//! POST /api/payment/stripe/create-reservation-checkout-session
//! GET  /api/payment/stripe/verify/{session_id}
//! POST /api/payment/stripe/webhook            - Unauthenticated, signed
//! ```

pub mod auth;
pub mod health;
pub mod orders;
pub mod payments;
pub mod refunds;
pub mod reservations;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

use crate::middleware::login_rate_limiter;
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login).layer(login_rate_limiter()))
        .route("/validate", put(auth::validate))
        .route("/logout", post(auth::logout))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list).post(orders::create))
        .route("/{id}", put(orders::modify))
        .route("/{id}/items", get(orders::items))
        .route(
            "/{id}/refund",
            post(orders::request_refund).delete(orders::cancel_refund),
        )
}

/// Create the reservation routes router.
pub fn reservation_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(reservations::list).post(reservations::create))
        .route("/counts", get(reservations::counts))
        .route("/services", get(reservations::services))
        .route("/staff", get(reservations::staff))
        .route(
            "/{id}",
            get(reservations::show).put(reservations::update),
        )
        .route(
            "/{id}/refund",
            post(reservations::request_refund).delete(reservations::cancel_refund),
        )
}

/// Create the refund routes router.
pub fn refund_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(refunds::list))
        .route("/{id}/action", post(refunds::action))
}

/// Create the Stripe payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/create-checkout-session",
            post(payments::create_order_checkout),
        )
        .route(
            "/create-reservation-checkout-session",
            post(payments::create_reservation_checkout),
        )
        .route("/verify/{session_id}", get(payments::verify))
        .route(
            "/webhook",
            post(payments::webhook).layer(DefaultBodyLimit::max(payments::WEBHOOK_BODY_LIMIT)),
        )
}

/// Create all routes for the POS API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth_routes())
        .route("/api/me", get(auth::me))
        .nest("/api/order", order_routes())
        .nest("/api/reservation", reservation_routes())
        .nest("/api/refund", refund_routes())
        .nest("/api/payment/stripe", payment_routes())
}
