//! Order lifecycle service.
//!
//! `OPEN -> CLOSED -> REFUND_PENDING -> {REFUNDED, CLOSED}`. Closing happens
//! through the payment bridge; refunds are resolved by the refund workflow.

use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument};

use dreampos_core::{EmployeeId, OrderId};

use crate::db::{OrderRepository, RepositoryError};
use crate::models::{OrderChanges, OrderFilter, OrderItemDetail, OrderSummary, RefundContact};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Request body failed validation.
    #[error("{0}")]
    Validation(String),

    /// Order does not exist.
    #[error("order not found")]
    NotFound,

    /// Order is not in the state the operation needs.
    #[error("{0}")]
    Conflict(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for OrderError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            RepositoryError::Invalid(msg) => Self::Validation(msg),
            other => Self::Repository(other),
        }
    }
}

/// Order lifecycle operations.
pub struct OrderService<'a> {
    orders: OrderRepository<'a>,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            orders: OrderRepository::new(pool),
        }
    }

    /// List orders matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn list(&self, filter: &OrderFilter) -> Result<Vec<OrderSummary>, OrderError> {
        Ok(self.orders.list(filter).await?)
    }

    /// Open an order for `employee` with its first items.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for a bad item list or tip.
    #[instrument(skip(self, changes))]
    pub async fn create(&self, employee: EmployeeId, changes: &OrderChanges) -> Result<OrderId, OrderError> {
        validate_changes(changes)?;
        let id = self.orders.create(employee, changes).await?;
        info!(order_id = %id, "Order created");
        Ok(id)
    }

    /// Replace items and optionally the tip on an `OPEN` order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Conflict` if the order is no longer open.
    #[instrument(skip(self, changes))]
    pub async fn modify(&self, id: OrderId, changes: &OrderChanges) -> Result<(), OrderError> {
        validate_changes(changes)?;
        self.orders.modify(id, changes).await?;
        Ok(())
    }

    /// Items on an order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    pub async fn items(&self, id: OrderId) -> Result<Vec<OrderItemDetail>, OrderError> {
        Ok(self.orders.items(id).await?)
    }

    /// Ask for a refund on a `CLOSED` order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for missing contact details.
    /// Returns `OrderError::Conflict` if the order is not closed.
    #[instrument(skip(self, contact))]
    pub async fn request_refund(&self, id: OrderId, contact: &RefundContact) -> Result<(), OrderError> {
        validate_refund_contact(contact).map_err(OrderError::Validation)?;
        self.orders.request_refund(id, contact).await?;
        info!(order_id = %id, "Refund requested");
        Ok(())
    }

    /// Withdraw a pending refund request.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Conflict` if there is no withdrawable request.
    #[instrument(skip(self))]
    pub async fn cancel_refund(&self, id: OrderId) -> Result<(), OrderError> {
        self.orders.cancel_refund(id).await?;
        info!(order_id = %id, "Refund request withdrawn");
        Ok(())
    }
}

fn validate_changes(changes: &OrderChanges) -> Result<(), OrderError> {
    if let Some(item) = changes.items.iter().find(|i| i.quantity <= 0) {
        return Err(OrderError::Validation(format!(
            "quantity for product {} must be positive",
            item.product_id
        )));
    }
    if changes.tip.is_some_and(|t| t < Decimal::ZERO) {
        return Err(OrderError::Validation("tip cannot be negative".to_owned()));
    }
    Ok(())
}

/// Check the contact block shared by order and reservation refund requests.
///
/// # Errors
///
/// Returns a field-level message for the first problem found.
pub fn validate_refund_contact(contact: &RefundContact) -> Result<(), String> {
    if contact.name.trim().is_empty() {
        return Err("name is required".to_owned());
    }
    if contact.reason.trim().is_empty() {
        return Err("reason is required".to_owned());
    }
    let email = contact.email.trim();
    if !email.is_empty() && !email.contains('@') {
        return Err("email is invalid".to_owned());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use dreampos_core::ProductId;

    use super::*;
    use crate::models::OrderItemInput;

    fn contact() -> RefundContact {
        RefundContact {
            name: "Kim".to_owned(),
            phone: "+15550100".to_owned(),
            email: "kim@example.com".to_owned(),
            reason: "damaged".to_owned(),
        }
    }

    #[test]
    fn test_refund_contact_validation() {
        assert!(validate_refund_contact(&contact()).is_ok());

        let mut missing_reason = contact();
        missing_reason.reason = "  ".to_owned();
        assert_eq!(validate_refund_contact(&missing_reason), Err("reason is required".to_owned()));

        let mut bad_email = contact();
        bad_email.email = "kim.example.com".to_owned();
        assert!(validate_refund_contact(&bad_email).is_err());

        let mut no_email = contact();
        no_email.email = String::new();
        assert!(validate_refund_contact(&no_email).is_ok());
    }

    #[test]
    fn test_changes_validation() {
        let zero_quantity = OrderChanges {
            items: vec![OrderItemInput {
                id: None,
                product_id: ProductId::new(1),
                quantity: 0,
                variations: vec![],
            }],
            tip: None,
        };
        assert!(matches!(validate_changes(&zero_quantity), Err(OrderError::Validation(_))));

        let negative_tip = OrderChanges {
            items: vec![],
            tip: Some(Decimal::NEGATIVE_ONE),
        };
        assert!(matches!(validate_changes(&negative_tip), Err(OrderError::Validation(_))));
    }

    #[test]
    fn test_repository_errors_map_to_lifecycle_errors() {
        assert!(matches!(OrderError::from(RepositoryError::NotFound), OrderError::NotFound));
        assert!(matches!(
            OrderError::from(RepositoryError::Conflict("x".to_owned())),
            OrderError::Conflict(_)
        ));
    }
}
