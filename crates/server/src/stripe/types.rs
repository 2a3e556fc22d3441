//! Stripe API wire types.

use std::collections::HashMap;

use serde::Deserialize;

use crate::models::{LineItem, PaymentTarget};

/// A checkout session as returned by `/v1/checkout/sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`.
    #[serde(default)]
    pub payment_status: Option<String>,
    /// `open`, `complete` or `expired`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// Whether the customer has paid.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    /// Whether the session expired without payment.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.status.as_deref() == Some("expired")
    }

    /// The order or reservation recorded in the session metadata.
    #[must_use]
    pub fn target(&self) -> Option<PaymentTarget> {
        PaymentTarget::from_metadata(|key| self.metadata.get(key).map(String::as_str))
    }
}

/// A page of checkout sessions from the list endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct SessionList {
    #[serde(default)]
    pub data: Vec<CheckoutSession>,
}

/// A refund as returned by `/v1/refunds`.
#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// A webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

/// The object an event is about.
#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Parameters for a hosted checkout session in `payment` mode.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub target: PaymentTarget,
    pub line_items: Vec<LineItem>,
    /// Lowercase ISO code.
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Encode as Stripe's bracketed form fields.
    #[must_use]
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("mode".to_owned(), "payment".to_owned()),
            ("success_url".to_owned(), self.success_url.clone()),
            ("cancel_url".to_owned(), self.cancel_url.clone()),
            ("client_reference_id".to_owned(), self.target.id().to_string()),
            ("metadata[type]".to_owned(), self.target.kind().to_owned()),
            (
                format!("metadata[{}]", self.target.id_key()),
                self.target.id().to_string(),
            ),
        ];

        for (i, item) in self.line_items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            fields.push((
                format!("{prefix}[price_data][currency]"),
                self.currency.clone(),
            ));
            fields.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
            fields.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount.to_string(),
            ));
            fields.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        }

        fields
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dreampos_core::{OrderId, ReservationId};

    use super::*;

    #[test]
    fn test_form_fields_encode_metadata_and_lines() {
        let request = CheckoutRequest {
            target: PaymentTarget::Reservation(ReservationId::new(8)),
            line_items: vec![LineItem {
                name: "Haircut".to_owned(),
                unit_amount: 2500,
                quantity: 1,
            }],
            currency: "usd".to_owned(),
            success_url: "https://pos.example/ok".to_owned(),
            cancel_url: "https://pos.example/cancel".to_owned(),
        };
        let fields: HashMap<String, String> = request.form_fields().into_iter().collect();

        assert_eq!(fields["mode"], "payment");
        assert_eq!(fields["metadata[type]"], "reservation");
        assert_eq!(fields["metadata[reservation_id]"], "8");
        assert_eq!(fields["line_items[0][price_data][unit_amount]"], "2500");
        assert_eq!(fields["line_items[0][price_data][product_data][name]"], "Haircut");
        assert_eq!(fields["line_items[0][quantity]"], "1");
    }

    #[test]
    fn test_session_deserializes_with_missing_fields() {
        let session: CheckoutSession = serde_json::from_str(
            r#"{"id":"cs_1","payment_status":"paid","payment_intent":"pi_1",
                "amount_total":1500,"currency":"usd",
                "metadata":{"type":"order","order_id":"42"}}"#,
        )
        .unwrap();
        assert!(session.is_paid());
        assert!(!session.is_expired());
        assert_eq!(session.target(), Some(PaymentTarget::Order(OrderId::new(42))));
        assert!(session.url.is_none());
    }

    #[test]
    fn test_session_list_takes_data() {
        let list: SessionList = serde_json::from_str(
            r#"{"object":"list","has_more":false,
                "data":[{"id":"cs_9","payment_intent":"pi_9","status":"open"}]}"#,
        )
        .unwrap();
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].id, "cs_9");

        let empty: SessionList = serde_json::from_str(r#"{"object":"list","data":[]}"#).unwrap();
        assert!(empty.data.is_empty());
    }
}
