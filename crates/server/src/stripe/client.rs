//! Stripe REST client.

use chrono::Utc;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument};

use super::error::StripeError;
use super::types::{ApiErrorBody, CheckoutRequest, CheckoutSession, Event, Refund, SessionList};
use super::webhook::verify_signature_at;
use crate::config::StripeConfig;
use crate::services::payments::CheckoutProvider;
use crate::services::refunds::RefundProcessor;

/// Stripe API client for checkout sessions and refunds.
#[derive(Clone)]
pub struct StripeClient {
    /// HTTP client.
    client: Client,
    /// API base URL without trailing slash.
    api_base: String,
    /// Secret API key.
    secret_key: SecretString,
    /// Endpoint secret for verifying webhooks.
    webhook_secret: SecretString,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Whether `id` is safe to place in a URL path segment.
pub(crate) fn is_valid_object_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::Config` if the HTTP client cannot be built.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StripeError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }

    /// Open a hosted checkout session.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or Stripe returns an error.
    #[instrument(skip(self, request), fields(target = %request.target))]
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, StripeError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&request.form_fields())
            .send()
            .await?;

        let session: CheckoutSession = parse_response(response).await?;
        debug!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    /// Fetch a checkout session's current state.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or Stripe returns an error.
    #[instrument(skip(self))]
    pub async fn get_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, StripeError> {
        if !is_valid_object_id(session_id) {
            return Err(StripeError::Request(format!(
                "invalid session id {session_id:?}"
            )));
        }

        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{session_id}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        parse_response(response).await
    }

    /// Find the checkout session that created a payment intent.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or Stripe returns an error.
    #[instrument(skip(self))]
    pub async fn find_session_by_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CheckoutSession>, StripeError> {
        if !is_valid_object_id(payment_intent_id) {
            return Err(StripeError::Request(format!(
                "invalid payment intent id {payment_intent_id:?}"
            )));
        }

        let response = self
            .client
            .get(format!(
                "{}/v1/checkout/sessions?payment_intent={payment_intent_id}&limit=1",
                self.api_base
            ))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        let list: SessionList = parse_response(response).await?;
        Ok(list.data.into_iter().next())
    }

    /// Refund `amount_cents` of a payment intent.
    ///
    /// The idempotency key is derived from the intent and amount, so an
    /// operator retry after an unknown outcome cannot refund twice.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::Timeout` if the outcome is unknown, other
    /// variants if the refund was not made.
    #[instrument(skip(self))]
    pub async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount_cents: i64,
    ) -> Result<Refund, StripeError> {
        let response = self
            .client
            .post(format!("{}/v1/refunds", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", format!("refund-{payment_intent_id}-{amount_cents}"))
            .form(&[
                ("payment_intent", payment_intent_id.to_owned()),
                ("amount", amount_cents.to_string()),
            ])
            .send()
            .await?;

        let refund: Refund = parse_response(response).await?;
        debug!(refund_id = %refund.id, status = ?refund.status, "Refund created");
        Ok(refund)
    }

    /// Verify a webhook body against its `Stripe-Signature` header.
    ///
    /// # Errors
    ///
    /// Returns error if signature verification or parsing fails.
    #[instrument(skip(self, payload, signature))]
    pub fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<Event, StripeError> {
        verify_signature_at(
            self.webhook_secret.expose_secret(),
            payload,
            signature,
            Utc::now().timestamp(),
        )
    }
}

/// Decode a success body, or turn an error body into `StripeError::Api`.
async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, StripeError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| StripeError::Response(e.to_string()));
    }

    let message = match response.json::<ApiErrorBody>().await {
        Ok(body) => body
            .error
            .message
            .or(body.error.code)
            .unwrap_or_else(|| "Unknown error".to_owned()),
        Err(_) => "Unreadable error body".to_owned(),
    };
    error!(status = status.as_u16(), %message, "Stripe API error");

    Err(StripeError::Api {
        status: status.as_u16(),
        message,
    })
}

impl CheckoutProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, StripeError> {
        Self::create_checkout_session(self, request).await
    }

    async fn get_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, StripeError> {
        Self::get_checkout_session(self, session_id).await
    }

    async fn find_session_by_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CheckoutSession>, StripeError> {
        Self::find_session_by_intent(self, payment_intent_id).await
    }
}

impl RefundProcessor for StripeClient {
    async fn refund(&self, payment_intent_id: &str, amount_cents: i64) -> Result<String, StripeError> {
        self.create_refund(payment_intent_id, amount_cents)
            .await
            .map(|r| r.id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> StripeConfig {
        StripeConfig {
            api_base: "https://api.stripe.test/".to_owned(),
            secret_key: SecretString::from("sk_test_123"),
            webhook_secret: SecretString::from("whsec_123"),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_debug_redacts_keys() {
        let client = StripeClient::new(&config()).unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk_test_123"));
        assert!(!debug.contains("whsec_123"));
        assert!(debug.contains("https://api.stripe.test\""));
    }

    #[test]
    fn test_object_id_validation() {
        assert!(is_valid_object_id("cs_test_a1B2c3"));
        assert!(!is_valid_object_id(""));
        assert!(!is_valid_object_id("cs_1/../refunds"));
        assert!(!is_valid_object_id("cs_1?expand=x"));
    }
}
