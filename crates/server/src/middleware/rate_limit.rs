//! Rate limiting for the login endpoint using governor and `tower_governor`.
//!
//! Client IPs come from `X-Forwarded-For`, `X-Real-IP` or `Forwarded` when
//! a proxy sets them, else from the peer address. The server must be served
//! with `into_make_service_with_connect_info::<SocketAddr>()` for the
//! fallback to work.

use std::sync::Arc;

use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<SmartIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Login limiter: one attempt replenished every 6 seconds, burst of 5.
///
/// # Panics
///
/// Never in practice: both settings are positive constants, which
/// `GovernorConfigBuilder` always accepts.
#[must_use]
pub fn login_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_second(6)
        .burst_size(5)
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}
