//! Payment confirmation bridge.
//!
//! Opens hosted checkout sessions for orders and reservations and closes the
//! parent once the processor reports the session paid. The amount recorded
//! when the session was opened is the reference: confirmation compares it
//! with what the processor charged and never takes an amount from the
//! client.
//!
//! Confirmation is reachable from two places, the terminal polling
//! `/verify/{session}` and the processor's webhook. Both end in the same
//! idempotent steps, so either may run first or twice.

use std::future::Future;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use dreampos_core::{
    AppointmentStatus, Money, OrderId, OrderStatus, PaymentMethod, PaymentStatus, ReservationId,
    cents_to_major, display_currency,
};

use crate::config::ServerConfig;
use crate::db::RepositoryError;
use crate::db::orders::OrderCheckout;
use crate::db::reservations::ReservationCheckout;
use crate::models::{
    AmountDue, CheckoutSessionView, LineItem, NewPayment, Payment, PaymentTarget, PaymentView,
};
use crate::stripe::{CheckoutRequest, CheckoutSession, Event, StripeError};

/// Persistence needed by the payment bridge.
pub trait PaymentStore: Send + Sync {
    /// Record a pending payment for a freshly opened session.
    fn create(
        &self,
        payment: &NewPayment,
    ) -> impl Future<Output = Result<Payment, RepositoryError>> + Send;

    fn get_by_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<Option<Payment>, RepositoryError>> + Send;

    /// Mark completed unless already completed. Returns whether a row changed.
    fn mark_completed(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Move a pending payment to `status`. Returns whether a row changed.
    fn settle_pending(
        &self,
        session_id: &str,
        status: PaymentStatus,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Run the paid transition of the order or reservation. `false` when it
    /// already happened.
    fn close_target(
        &self,
        target: PaymentTarget,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

/// Hosted checkout at the payment processor.
pub trait CheckoutProvider: Send + Sync {
    fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> impl Future<Output = Result<CheckoutSession, StripeError>> + Send;

    fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<CheckoutSession, StripeError>> + Send;

    /// The session a payment intent was created for, if any.
    fn find_session_by_intent(
        &self,
        payment_intent_id: &str,
    ) -> impl Future<Output = Result<Option<CheckoutSession>, StripeError>> + Send;
}

/// Errors from the payment bridge.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Request could not be turned into a chargeable checkout.
    #[error("{0}")]
    Validation(String),

    /// Order, reservation or session does not exist.
    #[error("not found")]
    NotFound,

    /// The order or reservation cannot be paid in its current state.
    #[error("{0}")]
    Conflict(String),

    /// The processor's view of a session disagrees with what was recorded.
    #[error("checkout session {0} does not match the recorded payment")]
    Mismatch(String),

    /// Processor call failed.
    #[error(transparent)]
    Processor(#[from] StripeError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for PaymentError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            RepositoryError::Invalid(msg) => Self::Validation(msg),
            other => Self::Repository(other),
        }
    }
}

/// Where the processor sends the customer afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUrls {
    pub success: String,
    pub cancel: String,
}

impl RedirectUrls {
    /// Frontend pages for `target`. `{CHECKOUT_SESSION_ID}` is filled in by the processor.
    #[must_use]
    pub fn for_target(config: &ServerConfig, target: PaymentTarget) -> Self {
        let base = match target {
            PaymentTarget::Order(_) => "/payment",
            PaymentTarget::Reservation(_) => "/reservation-payment",
        };
        let key = target.id_key();
        let id = target.id();
        Self {
            success: config.frontend_path(&format!(
                "{base}/success?session_id={{CHECKOUT_SESSION_ID}}&{key}={id}"
            )),
            cancel: config.frontend_path(&format!("{base}/cancel?{key}={id}")),
        }
    }
}

/// Amount and lines for paying an order.
///
/// A `Tip` line is added when the order carries one. If the lines do not
/// add up to the order total (order-level discounts, rounding) the checkout
/// falls back to one line for the whole order so the customer is charged
/// exactly the total.
///
/// # Errors
///
/// Returns `PaymentError::Conflict` unless the order is `OPEN`.
pub fn order_checkout_lines(
    id: OrderId,
    checkout: &OrderCheckout,
    mut lines: Vec<LineItem>,
) -> Result<(AmountDue, Vec<LineItem>), PaymentError> {
    if checkout.status != OrderStatus::Open {
        return Err(PaymentError::Conflict(format!(
            "order {id} is {} and cannot be paid",
            checkout.status.as_api_str()
        )));
    }

    if checkout.tip_cents > 0 {
        lines.push(LineItem {
            name: "Tip".to_owned(),
            unit_amount: checkout.tip_cents,
            quantity: 1,
        });
    }

    let sum = lines
        .iter()
        .map(LineItem::subtotal)
        .fold(0_i64, i64::saturating_add);
    if lines.is_empty() || sum != checkout.due.cents {
        lines = vec![LineItem {
            name: format!("Order #{id}"),
            unit_amount: checkout.due.cents,
            quantity: 1,
        }];
    }

    Ok((checkout.due.clone(), lines))
}

/// Amount and the single service line for paying a reservation.
///
/// # Errors
///
/// Returns `PaymentError::Conflict` unless the reservation is pending or confirmed.
pub fn reservation_checkout_lines(
    id: ReservationId,
    checkout: &ReservationCheckout,
) -> Result<(AmountDue, Vec<LineItem>), PaymentError> {
    if !AppointmentStatus::COMPLETABLE.contains(&checkout.status) {
        return Err(PaymentError::Conflict(format!(
            "reservation {id} is {} and cannot be paid",
            checkout.status
        )));
    }
    let line = LineItem {
        name: checkout.service_name.clone(),
        unit_amount: checkout.due.cents,
        quantity: 1,
    };
    Ok((checkout.due.clone(), vec![line]))
}

/// Checkout and confirmation against the payment processor.
pub struct PaymentBridge<S, C> {
    store: S,
    provider: C,
}

impl<S: PaymentStore, C: CheckoutProvider> PaymentBridge<S, C> {
    #[must_use]
    pub const fn new(store: S, provider: C) -> Self {
        Self { store, provider }
    }

    /// Open a hosted checkout session and record a pending payment for it.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Validation` for a non-positive amount or missing currency.
    /// Returns `PaymentError::Processor` if the session cannot be created.
    #[instrument(skip(self, due, line_items, urls), fields(target = %target))]
    pub async fn open_checkout(
        &self,
        target: PaymentTarget,
        due: &AmountDue,
        line_items: Vec<LineItem>,
        urls: RedirectUrls,
    ) -> Result<CheckoutSessionView, PaymentError> {
        let amount = Money::chargeable(due.cents, &due.currency)
            .map_err(|e| PaymentError::Validation(e.to_string()))?;

        let request = CheckoutRequest {
            target,
            line_items,
            currency: amount.currency().to_owned(),
            success_url: urls.success,
            cancel_url: urls.cancel,
        };
        let session = self.provider.create_checkout_session(&request).await?;
        let url = session.url.clone().ok_or_else(|| {
            StripeError::Response(format!("checkout session {} has no url", session.id))
        })?;

        self.store
            .create(&NewPayment {
                target,
                amount,
                method: PaymentMethod::Stripe,
                session_id: session.id.clone(),
            })
            .await?;

        info!(session_id = %session.id, "Checkout session opened");
        Ok(CheckoutSessionView {
            session_id: session.id,
            url,
        })
    }

    /// Reconcile a checkout session with the processor.
    ///
    /// Paid sessions whose amount, currency and target match the recorded
    /// payment complete it and close the order or reservation. Repeated
    /// calls return the same completed payment.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Mismatch` when the processor charged something
    /// other than what was recorded.
    /// Returns `PaymentError::Processor` if the session cannot be fetched.
    #[instrument(skip(self))]
    pub async fn confirm(&self, session_id: &str) -> Result<PaymentView, PaymentError> {
        let session = self.provider.get_checkout_session(session_id).await?;

        let Some(payment) = self.store.get_by_session(session_id).await? else {
            warn!("No payment recorded for checkout session");
            return Ok(synthesize_view(&session));
        };

        if !session.is_paid() {
            if session.is_expired() {
                self.store
                    .settle_pending(session_id, PaymentStatus::Cancelled)
                    .await?;
            }
            return self.reload(session_id).await;
        }

        verify_session(&session, &payment)?;

        if self
            .store
            .mark_completed(session_id, session.payment_intent.as_deref())
            .await?
        {
            info!(target = %payment.target, "Payment completed");
        }
        // Runs even when the payment was already completed, so a crash between
        // the two writes heals on the next confirmation.
        if self.store.close_target(payment.target).await? {
            info!(target = %payment.target, "Paid transition applied");
        }

        self.reload(session_id).await
    }

    /// Handle a verified webhook event.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Processor` for an event without an object id
    /// and any error from the confirmation path.
    #[instrument(skip(self, event), fields(event_id = %event.id, kind = %event.kind))]
    pub async fn handle_event(&self, event: &Event) -> Result<(), PaymentError> {
        let object_id = || {
            event
                .data
                .object
                .get("id")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| {
                    PaymentError::Processor(StripeError::InvalidPayload(format!(
                        "{} event without object id",
                        event.kind
                    )))
                })
        };

        match event.kind.as_str() {
            "checkout.session.completed" => {
                self.confirm(object_id()?).await?;
            }
            "checkout.session.expired" => {
                self.store
                    .settle_pending(object_id()?, PaymentStatus::Cancelled)
                    .await?;
            }
            "payment_intent.payment_failed" => {
                // The intent id is only stored on completion, so resolve the
                // session through the processor.
                let intent = object_id()?;
                match self.provider.find_session_by_intent(intent).await? {
                    Some(session) => {
                        let failed = self
                            .store
                            .settle_pending(&session.id, PaymentStatus::Failed)
                            .await?;
                        info!(session_id = %session.id, failed, "Payment intent failed");
                    }
                    None => warn!(intent, "Failed payment intent has no checkout session"),
                }
            }
            other => debug!(kind = other, "Ignoring webhook event"),
        }
        Ok(())
    }

    async fn reload(&self, session_id: &str) -> Result<PaymentView, PaymentError> {
        self.store
            .get_by_session(session_id)
            .await?
            .map(PaymentView::from)
            .ok_or(PaymentError::NotFound)
    }
}

/// Compare the processor's session with the payment recorded when it was opened.
fn verify_session(session: &CheckoutSession, payment: &Payment) -> Result<(), PaymentError> {
    let charged = session.amount_total.zip(session.currency.as_deref());
    let amount_ok = charged.is_some_and(|(cents, currency)| {
        payment.amount_cents == cents && payment.currency.eq_ignore_ascii_case(currency.trim())
    });
    let target_ok = session.target().is_none_or(|t| t == payment.target);

    if amount_ok && target_ok {
        return Ok(());
    }
    error!(
        session_id = %session.id,
        recorded_cents = payment.amount_cents,
        recorded_currency = %payment.currency,
        charged_cents = ?session.amount_total,
        charged_currency = ?session.currency,
        "Checkout session does not match recorded payment"
    );
    Err(PaymentError::Mismatch(session.id.clone()))
}

/// Payment view built from processor state alone.
fn synthesize_view(session: &CheckoutSession) -> PaymentView {
    let target = session.target();
    let amount_cents = session.amount_total.unwrap_or_default();
    PaymentView {
        id: None,
        order_id: target.and_then(PaymentTarget::order_id),
        reservation_id: target.and_then(PaymentTarget::reservation_id),
        amount_cents,
        amount: cents_to_major(amount_cents),
        currency: display_currency(session.currency.as_deref()),
        payment_method: PaymentMethod::Stripe,
        stripe_session_id: Some(session.id.clone()),
        stripe_payment_intent_id: session.payment_intent.clone(),
        status: if session.is_paid() {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Pending
        },
        created_at: None,
        updated_at: None,
    }
}
