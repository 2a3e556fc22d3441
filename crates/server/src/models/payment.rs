//! Payment types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dreampos_core::{
    Money, OrderId, PaymentId, PaymentMethod, PaymentStatus, ReservationId, cents_to_major,
};

/// What a checkout pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentTarget {
    Order(OrderId),
    Reservation(ReservationId),
}

impl PaymentTarget {
    /// Value of the `type` metadata key recorded on the checkout session.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Order(_) => "order",
            Self::Reservation(_) => "reservation",
        }
    }

    /// Metadata key holding the parent id.
    #[must_use]
    pub const fn id_key(self) -> &'static str {
        match self {
            Self::Order(_) => "order_id",
            Self::Reservation(_) => "reservation_id",
        }
    }

    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Order(id) => id.as_i64(),
            Self::Reservation(id) => id.as_i64(),
        }
    }

    #[must_use]
    pub const fn order_id(self) -> Option<OrderId> {
        match self {
            Self::Order(id) => Some(id),
            Self::Reservation(_) => None,
        }
    }

    #[must_use]
    pub const fn reservation_id(self) -> Option<ReservationId> {
        match self {
            Self::Order(_) => None,
            Self::Reservation(id) => Some(id),
        }
    }

    /// Recover the target from checkout session metadata.
    ///
    /// Sessions created before the `type` key existed only carry `order_id`.
    #[must_use]
    pub fn from_metadata<'a>(lookup: impl Fn(&str) -> Option<&'a str>) -> Option<Self> {
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<i64>().ok());
        match lookup("type") {
            Some("reservation") => parse("reservation_id").map(|id| Self::Reservation(id.into())),
            Some("order") | None => parse("order_id").map(|id| Self::Order(id.into())),
            Some(_) => None,
        }
    }
}

impl std::fmt::Display for PaymentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// A stored payment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub id: PaymentId,
    pub target: PaymentTarget,
    pub amount_cents: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// JSON form of [`Payment`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    /// Absent when the payment was synthesized from processor state.
    pub id: Option<PaymentId>,
    pub order_id: Option<OrderId>,
    pub reservation_id: Option<ReservationId>,
    pub amount_cents: i64,
    pub amount: f64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub stripe_session_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    pub status: PaymentStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentView {
    fn from(p: Payment) -> Self {
        Self {
            id: Some(p.id),
            order_id: p.target.order_id(),
            reservation_id: p.target.reservation_id(),
            amount_cents: p.amount_cents,
            amount: cents_to_major(p.amount_cents),
            currency: p.currency.to_ascii_uppercase(),
            payment_method: p.method,
            stripe_session_id: p.session_id,
            stripe_payment_intent_id: p.payment_intent_id,
            status: p.status,
            created_at: Some(p.created_at),
            updated_at: Some(p.updated_at),
        }
    }
}

/// A payment row to insert when a checkout session is opened.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub target: PaymentTarget,
    pub amount: Money,
    pub method: PaymentMethod,
    pub session_id: String,
}

/// Body of `POST /api/payment/stripe/create-checkout-session`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCheckoutRequest {
    pub order_id: OrderId,
}

/// Body of `POST /api/payment/stripe/create-reservation-checkout-session`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationCheckoutRequest {
    pub reservation_id: ReservationId,
}

/// Returned after opening a checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionView {
    pub session_id: String,
    pub url: String,
}
