//! SMS notifications over the Twilio REST API.
//!
//! Only one message is sent today: the booking confirmation for a
//! reservation created as `confirmed`. Delivery is best effort and never
//! fails the request that triggered it.

use std::future::Future;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::TwilioConfig;
use crate::models::Reservation;

/// Twilio API base URL.
const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Errors that can occur when sending SMS.
#[derive(Debug, Error)]
pub enum SmsError {
    /// HTTP request failed.
    #[error("SMS request failed: {0}")]
    Request(String),

    /// Twilio rejected the message.
    #[error("SMS API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Something that can text a customer about their reservation.
pub trait SmsNotifier: Send + Sync {
    /// Send the booking confirmation for `reservation`.
    fn send_reservation_confirmation(
        &self,
        reservation: &Reservation,
    ) -> impl Future<Output = Result<(), SmsError>> + Send;
}

/// Body of the booking confirmation text.
#[must_use]
pub fn confirmation_message(reservation: &Reservation) -> String {
    format!(
        "Reservation Confirmed!\nService: {} by {}\nFor: {}\nDate: {}\n\nThank you for booking with us!\nDreamPoS",
        reservation.service_name,
        reservation.staff_name,
        reservation.customer_name,
        reservation.datetime.format("%Y-%m-%d %H:%M"),
    )
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Twilio client for outbound SMS.
#[derive(Clone)]
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: SecretString,
    from_number: String,
}

impl std::fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioClient")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .finish_non_exhaustive()
    }
}

impl TwilioClient {
    /// Create a new Twilio client.
    #[must_use]
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            client: Client::new(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
        }
    }

    /// Send `body` to `to`.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or Twilio rejects the message.
    #[instrument(skip(self, body))]
    pub async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let response = self
            .client
            .post(format!(
                "{TWILIO_API_BASE}/Accounts/{}/Messages.json",
                self.account_sid
            ))
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| SmsError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<TwilioErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| "Unknown error".to_owned());
            return Err(SmsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("SMS sent");
        Ok(())
    }
}

impl SmsNotifier for TwilioClient {
    async fn send_reservation_confirmation(&self, reservation: &Reservation) -> Result<(), SmsError> {
        self.send(&reservation.customer_phone, &confirmation_message(reservation))
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use dreampos_core::{EmployeeId, ReservationId, ReservationStatus, ServiceId};

    use super::*;

    #[test]
    fn test_confirmation_message() {
        let reservation = Reservation {
            id: ReservationId::new(1),
            customer_name: "Jo".to_owned(),
            customer_phone: "+15550100".to_owned(),
            staff_id: EmployeeId::new(2),
            staff_name: "Sam Lee".to_owned(),
            service_id: ServiceId::new(3),
            service_name: "Massage".to_owned(),
            datetime: Utc.with_ymd_and_hms(2026, 3, 14, 9, 5, 0).single().unwrap_or_default(),
            status: ReservationStatus::Confirmed,
        };

        assert_eq!(
            confirmation_message(&reservation),
            "Reservation Confirmed!\nService: Massage by Sam Lee\nFor: Jo\nDate: 2026-03-14 09:05\n\nThank you for booking with us!\nDreamPoS"
        );
    }
}
