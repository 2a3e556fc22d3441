//! Stripe payment route handlers.
//!
//! The terminal opens a hosted checkout session, sends the customer to it,
//! then polls `verify` with the session id. Stripe also calls the webhook;
//! either path completes the payment and closes the order or reservation.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use tracing::{instrument, warn};

use crate::db::{OrderRepository, PaymentRepository, ReservationRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{
    CheckoutSessionView, OrderCheckoutRequest, PaymentTarget, PaymentView,
    ReservationCheckoutRequest,
};
use crate::services::payments::{
    PaymentBridge, RedirectUrls, order_checkout_lines, reservation_checkout_lines,
};
use crate::state::AppState;
use crate::stripe::{StripeClient, is_valid_object_id};

/// Webhook bodies above this size are rejected before verification.
pub const WEBHOOK_BODY_LIMIT: usize = 64 * 1024;

const SIGNATURE_HEADER: &str = "Stripe-Signature";

fn bridge(state: &AppState) -> PaymentBridge<PaymentRepository<'_>, StripeClient> {
    PaymentBridge::new(PaymentRepository::new(state.pool()), state.stripe().clone())
}

/// `POST /api/payment/stripe/create-checkout-session`
pub async fn create_order_checkout(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Json(request): Json<OrderCheckoutRequest>,
) -> Result<Json<CheckoutSessionView>> {
    let id = request.order_id;
    let orders = OrderRepository::new(state.pool());
    let checkout = orders
        .checkout(id)
        .await?
        .ok_or_else(|| AppError::NotFound("order not found".to_owned()))?;
    let lines = orders.line_items(id).await?;
    let (due, lines) = order_checkout_lines(id, &checkout, lines)?;

    let target = PaymentTarget::Order(id);
    let urls = RedirectUrls::for_target(state.config(), target);
    let view = bridge(&state).open_checkout(target, &due, lines, urls).await?;
    Ok(Json(view))
}

/// `POST /api/payment/stripe/create-reservation-checkout-session`
pub async fn create_reservation_checkout(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Json(request): Json<ReservationCheckoutRequest>,
) -> Result<Json<CheckoutSessionView>> {
    let id = request.reservation_id;
    let checkout = ReservationRepository::new(state.pool())
        .checkout(id)
        .await?
        .ok_or_else(|| AppError::NotFound("reservation not found".to_owned()))?;
    let (due, lines) = reservation_checkout_lines(id, &checkout)?;

    let target = PaymentTarget::Reservation(id);
    let urls = RedirectUrls::for_target(state.config(), target);
    let view = bridge(&state).open_checkout(target, &due, lines, urls).await?;
    Ok(Json(view))
}

/// `GET /api/payment/stripe/verify/{session_id}`
pub async fn verify(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(session_id): Path<String>,
) -> Result<Json<PaymentView>> {
    if !is_valid_object_id(&session_id) {
        return Err(AppError::BadRequest("invalid session id".to_owned()));
    }
    Ok(Json(bridge(&state).confirm(&session_id).await?))
}

/// `POST /api/payment/stripe/webhook`
///
/// Unauthenticated; the signature header is the only credential. Any
/// failure answers 400 so Stripe retries.
#[instrument(skip_all)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    const FAILED: (StatusCode, &str) = (StatusCode::BAD_REQUEST, "webhook processing failed");

    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        warn!("Webhook without signature header");
        return FAILED;
    };

    let event = match state.stripe().verify_webhook(&body, signature) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Webhook rejected");
            return FAILED;
        }
    };

    match bridge(&state).handle_event(&event).await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!(event_id = %event.id, error = %e, "Webhook event failed");
            FAILED
        }
    }
}
