//! Refund request types.
//!
//! A refund request is attached to exactly one parent, an order or a
//! reservation, and shares its id. [`RefundParent`] carries both the id and
//! the discriminator so the two can never be mixed up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dreampos_core::{
    OrderId, PaymentId, PaymentMethod, PaymentStatus, RefundRequestStatus, RefundType, ReservationId,
};

/// The order or reservation a refund request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefundParent {
    Order(OrderId),
    Reservation(ReservationId),
}

impl RefundParent {
    /// Build from a raw id and its discriminator.
    #[must_use]
    pub const fn new(id: i64, refund_type: RefundType) -> Self {
        match refund_type {
            RefundType::Order => Self::Order(OrderId::new(id)),
            RefundType::Reservation => Self::Reservation(ReservationId::new(id)),
        }
    }

    #[must_use]
    pub const fn refund_type(self) -> RefundType {
        match self {
            Self::Order(_) => RefundType::Order,
            Self::Reservation(_) => RefundType::Reservation,
        }
    }

    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Order(id) => id.as_i64(),
            Self::Reservation(id) => id.as_i64(),
        }
    }
}

impl std::fmt::Display for RefundParent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.refund_type(), self.id())
    }
}

/// One entry of the pending-refunds projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRefund {
    pub id: i64,
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<ReservationId>,
    pub refund_type: RefundType,
    /// Major units; zero when no payment is on file.
    pub amount: f64,
    pub currency: String,
    pub reason: String,
    pub status: RefundRequestStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_refund_id: Option<String>,
}

/// The payment a refund would be returned against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundablePayment {
    pub id: PaymentId,
    pub amount_cents: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub payment_intent_id: Option<String>,
}

/// An open refund request with the payment it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRecord {
    pub parent: RefundParent,
    pub status: RefundRequestStatus,
    /// Best payment for the parent: completed first, then most recent.
    pub payment: Option<RefundablePayment>,
}

/// Body of `POST /api/refund/{id}/action`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundActionRequest {
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub refund_type: Option<String>,
}

/// What an approve or disapprove decision ended in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    /// Money returned through the processor.
    Refunded { processor_refund_id: String },
    /// No processor payment on file; the parent was marked refunded directly.
    RefundedOffline,
    Disapproved,
}

impl RefundOutcome {
    /// Operator-facing confirmation message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Refunded {
                processor_refund_id,
            } => format!(
                "Refund approved and completed successfully. Stripe ID: {processor_refund_id}"
            ),
            Self::RefundedOffline => "Refund approved and completed successfully.".to_owned(),
            Self::Disapproved => "Refund disapproved.".to_owned(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_round_trip() {
        let parent = RefundParent::new(9, RefundType::Reservation);
        assert_eq!(parent, RefundParent::Reservation(ReservationId::new(9)));
        assert_eq!(parent.refund_type(), RefundType::Reservation);
        assert_eq!(parent.id(), 9);
        assert_eq!(parent.to_string(), "reservation 9");
    }

    #[test]
    fn test_pending_refund_json_shape() {
        let refund = PendingRefund {
            id: 4,
            order_id: Some(OrderId::new(4)),
            reservation_id: None,
            refund_type: RefundType::Order,
            amount: 12.5,
            currency: "USD".to_owned(),
            reason: "damaged".to_owned(),
            status: RefundRequestStatus::Pending,
            requested_at: Utc::now(),
            processed_at: None,
            stripe_refund_id: None,
        };
        let json = serde_json::to_value(&refund).unwrap();
        assert_eq!(json["refundType"], "order");
        assert_eq!(json["status"], "Pending");
        assert_eq!(json["orderId"], 4);
        assert!(json.get("reservationId").is_none());
    }

    #[test]
    fn test_outcome_messages() {
        let approved = RefundOutcome::Refunded {
            processor_refund_id: "re_123".to_owned(),
        };
        assert!(approved.message().ends_with("Stripe ID: re_123"));
        assert_eq!(RefundOutcome::Disapproved.message(), "Refund disapproved.");
    }
}
