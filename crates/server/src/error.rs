//! Unified error handling with Sentry integration.
//!
//! Every route handler returns `Result<T, AppError>`. Server-side failures
//! (database, payment processor, token generation) are captured to Sentry
//! and logged with full context; the client only sees a generic message.
//! Bodies are JSON: `{"error": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::orders::OrderError;
use crate::services::payments::PaymentError;
use crate::services::refunds::RefundError;
use crate::services::reservations::ReservationError;
use crate::stripe::StripeError;

/// Application-level error type for the POS API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Payment processor call failed.
    #[error("Stripe error: {0}")]
    Stripe(#[from] StripeError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// State conflict, e.g. a guarded transition matched nothing.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Database(RepositoryError::Invalid(_)) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Stripe(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::NotValidated => StatusCode::UNAUTHORIZED,
                AuthError::TokenGeneration(_)
                | AuthError::Repository(_)
                | AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show the client.
    fn public_message(&self) -> String {
        match self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_owned(),
            Self::Database(RepositoryError::Conflict(msg) | RepositoryError::Invalid(msg)) => {
                msg.clone()
            }
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_owned(),
            Self::Stripe(_) => "Payment processor error".to_owned(),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid credentials".to_owned(),
                AuthError::NotValidated => "Not validated".to_owned(),
                _ => "Internal server error".to_owned(),
            },
            Self::NotFound(msg) | Self::Conflict(msg) | Self::BadRequest(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(msg) => Self::BadRequest(msg),
            OrderError::NotFound => Self::NotFound("order not found".to_owned()),
            OrderError::Conflict(msg) => Self::Conflict(msg),
            OrderError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::Validation(msg) => Self::BadRequest(msg),
            ReservationError::NotFound => Self::NotFound("reservation not found".to_owned()),
            ReservationError::Conflict(msg) => Self::Conflict(msg),
            ReservationError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<RefundError> for AppError {
    fn from(err: RefundError) -> Self {
        match err {
            RefundError::Validation(msg) => Self::BadRequest(msg),
            RefundError::NotFound => Self::NotFound("refund request not found".to_owned()),
            RefundError::Conflict(msg) => Self::Conflict(msg),
            RefundError::Processor(e) => Self::Stripe(e),
            RefundError::Repository(e) => Self::Database(e),
            e @ (RefundError::ProcessorTimeout | RefundError::MissingPaymentIntent(_)) => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Validation(msg) => Self::BadRequest(msg),
            PaymentError::NotFound => Self::NotFound("payment not found".to_owned()),
            PaymentError::Conflict(msg) => Self::Conflict(msg),
            PaymentError::Processor(e) => Self::Stripe(e),
            PaymentError::Repository(e) => Self::Database(e),
            e @ PaymentError::Mismatch(_) => Self::Internal(e.to_string()),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the authenticated employee.
pub fn set_sentry_user(username: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            username: Some(username.to_owned()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(get_status(AppError::NotFound("x".to_owned())), StatusCode::NOT_FOUND);
        assert_eq!(get_status(AppError::Conflict("x".to_owned())), StatusCode::CONFLICT);
        assert_eq!(get_status(AppError::BadRequest("x".to_owned())), StatusCode::BAD_REQUEST);
        assert_eq!(
            get_status(AppError::Auth(AuthError::InvalidCredentials)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Internal("x".to_owned())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_refund_errors_map_to_status() {
        assert_eq!(
            get_status(RefundError::Conflict("processing".to_owned()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(get_status(RefundError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(RefundError::ProcessorTimeout.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(
                RefundError::Processor(StripeError::Api {
                    status: 402,
                    message: "card declined".to_owned()
                })
                .into()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_not_exposed() {
        let err = AppError::Database(RepositoryError::DataCorruption(
            "SELECT secret FROM vault".to_owned(),
        ));
        let body = to_bytes(err.into_response().into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_dangling_reference_is_a_bad_request() {
        let err: AppError = OrderError::from(RepositoryError::Invalid(
            "insert order item: references a record that does not exist".to_owned(),
        ))
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let message = json["error"].as_str().unwrap();
        assert_eq!(message, "insert order item: references a record that does not exist");
        assert!(!message.contains("constraint"));
    }

    #[test]
    fn test_repository_errors_keep_their_status() {
        assert_eq!(get_status(RepositoryError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(RepositoryError::Conflict("taken".to_owned()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(RepositoryError::Invalid("bad role".to_owned()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_validation_message_is_exposed() {
        let err: AppError = ReservationError::Validation("customerName is required".to_owned()).into();
        let body = to_bytes(err.into_response().into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "customerName is required");
    }
}
