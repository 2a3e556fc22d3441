//! DreamPOS server library.
//!
//! Staff authentication, orders, reservations, refunds and Stripe payments
//! for the point-of-sale terminal. The binary in `main.rs` wires these into
//! an Axum server; [`app`] is exposed so tests and tools build the same
//! router.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod sms;
pub mod state;
pub mod stripe;

use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, header},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::middleware::{REQUEST_ID_HEADER, request_id_middleware};
use crate::state::AppState;

/// Build the full application router with its middleware stack.
///
/// Layers are listed innermost first; see [`middleware`] for the resulting
/// order.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(state.config());

    Router::new()
        .merge(routes::routes())
        .with_state(state)
        .layer(cors)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                    username = tracing::field::Empty,
                )
            }),
        )
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// CORS for the terminal frontend: a single origin, with credentials.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origin = config.frontend_url.origin().ascii_serialization();
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-xsrf-token"),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .allow_credentials(true);

    match HeaderValue::from_str(&origin) {
        Ok(value) => layer.allow_origin(value),
        Err(e) => {
            tracing::warn!(origin = %origin, error = %e, "Invalid frontend origin; CORS disabled");
            layer
        }
    }
}
