//! Webhook signature verification.
//!
//! The `Stripe-Signature` header looks like `t=1700000000,v1=<hex>,v1=<hex>`.
//! Each `v1` is an HMAC-SHA256 of `"{t}.{raw body}"` keyed with the endpoint
//! secret; more than one appears while a secret is being rolled.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::StripeError;
use super::types::Event;
use crate::services::token::constant_time_eq;

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verify a webhook body against its `Stripe-Signature` header as of `now`
/// (unix seconds) and parse the event.
///
/// # Errors
///
/// Returns `StripeError::InvalidSignature` if the header is malformed, too
/// old, or carries no matching signature.
/// Returns `StripeError::InvalidPayload` if the verified body is not an event.
pub fn verify_signature_at(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
) -> Result<Event, StripeError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| StripeError::InvalidSignature("missing timestamp".to_owned()))?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| StripeError::InvalidSignature("invalid timestamp".to_owned()))?;

    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(StripeError::InvalidSignature(
            "timestamp outside tolerance".to_owned(),
        ));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| StripeError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    if !signatures
        .iter()
        .any(|sig| constant_time_eq(expected.as_bytes(), sig.as_bytes()))
    {
        return Err(StripeError::InvalidSignature(
            "signature mismatch".to_owned(),
        ));
    }

    serde_json::from_slice(payload).map_err(|e| StripeError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const BODY: &[u8] =
        br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;

    fn sign(secret: &str, ts: i64, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{ts}.").as_bytes());
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let now = 1_700_000_000;
        let header = format!("t={now},v1={}", sign(SECRET, now, BODY));
        let event = verify_signature_at(SECRET, BODY, &header, now + 10).unwrap();
        assert_eq!(event.kind, "checkout.session.completed");
        assert_eq!(event.data.object["id"], "cs_1");
    }

    #[test]
    fn test_any_v1_may_match() {
        let now = 1_700_000_000;
        let header = format!(
            "t={now},v1={},v1={}",
            sign("whsec_old", now, BODY),
            sign(SECRET, now, BODY)
        );
        assert!(verify_signature_at(SECRET, BODY, &header, now).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let now = 1_700_000_000;
        let header = format!("t={now},v1={}", sign("whsec_other", now, BODY));
        let err = verify_signature_at(SECRET, BODY, &header, now).unwrap_err();
        assert!(matches!(err, StripeError::InvalidSignature(_)));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let now = 1_700_000_000;
        let header = format!("t={now},v1={}", sign(SECRET, now, BODY));
        let tampered = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_2"}}}"#;
        assert!(verify_signature_at(SECRET, tampered, &header, now).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let signed_at = 1_700_000_000;
        let header = format!("t={signed_at},v1={}", sign(SECRET, signed_at, BODY));
        let err = verify_signature_at(SECRET, BODY, &header, signed_at + SIGNATURE_TOLERANCE_SECS + 1)
            .unwrap_err();
        assert!(matches!(err, StripeError::InvalidSignature(_)));
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(verify_signature_at(SECRET, BODY, "v1=abc", 0).is_err());
        assert!(verify_signature_at(SECRET, BODY, "t=soon,v1=abc", 0).is_err());
        assert!(verify_signature_at(SECRET, BODY, "", 0).is_err());
    }
}
