//! Database operations for the DreamPOS `PostgreSQL` store.
//!
//! The database is the only shared mutable state. Every lifecycle transition
//! is a single conditional `UPDATE ... WHERE id = $1 AND status = $expected`
//! whose affected-row count decides whether the transition happened, so
//! several server instances can run against one database without
//! coordinating.
//!
//! ## Tables
//!
//! - `business`, `location`, `country` - Tenancy and currency
//! - `employee`, `role`, `employee_role` - Credentials and role labels
//! - `item`, `item_variation` - Catalog
//! - `order_data`, `order_item`, `order_item_variation` - Orders (`order_detail` view for totals)
//! - `service`, `service_location`, `service_employee` - Bookable services
//! - `appointment`, `appointment_bill` - Reservations
//! - `refund_data`, `reservation_refund_data` - Open refund requests
//! - `payment` - Checkout attempts
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/`, applied at startup
//! and available via:
//! ```bash
//! cargo run -p dreampos-cli -- migrate
//! ```
//!
//! Queries are built at runtime (`sqlx::query_as::<_, T>`) so the crate
//! builds without a live database or offline query cache.

pub mod orders;
pub mod payments;
pub mod refunds;
pub mod reservations;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::warn;

pub use orders::OrderRepository;
pub use payments::PaymentRepository;
pub use refunds::RefundRepository;
pub use reservations::ReservationRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// A guarded transition matched no row, or a unique key is taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller-supplied data referenced a missing row or broke a check.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl RepositoryError {
    /// Map a constraint violation to `Conflict` or `Invalid`, anything else
    /// to `Database`.
    ///
    /// The database's own message names tables and constraints, so it is
    /// logged here and the returned error carries a fixed description.
    pub(crate) fn from_constraint(err: sqlx::Error, what: &str) -> Self {
        let sqlx::Error::Database(ref db_err) = err else {
            return Self::Database(err);
        };
        let Some(mapped) = db_err
            .code()
            .and_then(|code| Self::for_sqlstate(&code, what))
        else {
            return Self::Database(err);
        };
        warn!(
            what,
            constraint = db_err.constraint(),
            detail = db_err.message(),
            "Constraint violation"
        );
        mapped
    }

    /// Client-facing error for an integrity-violation SQLSTATE.
    fn for_sqlstate(code: &str, what: &str) -> Option<Self> {
        match code {
            "23505" => Some(Self::Conflict(format!("{what}: already exists"))),
            "23503" => Some(Self::Invalid(format!(
                "{what}: references a record that does not exist"
            ))),
            "23514" => Some(Self::Invalid(format!("{what}: value is not allowed"))),
            _ => None,
        }
    }
}

/// Require that a guarded statement touched exactly one row.
pub(crate) fn expect_single_row(rows: u64, transition: &str) -> Result<(), RepositoryError> {
    match rows {
        1 => Ok(()),
        0 => Err(RepositoryError::Conflict(format!(
            "{transition}: no row in the expected state"
        ))),
        n => Err(RepositoryError::DataCorruption(format!(
            "{transition}: {n} rows matched a single-row guard"
        ))),
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Apply pending migrations from `crates/server/migrations/`.
///
/// # Errors
///
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_mapping() {
        assert!(matches!(
            RepositoryError::for_sqlstate("23505", "record payment"),
            Some(RepositoryError::Conflict(msg)) if msg == "record payment: already exists"
        ));
        assert!(matches!(
            RepositoryError::for_sqlstate("23503", "insert order item"),
            Some(RepositoryError::Invalid(msg))
                if msg == "insert order item: references a record that does not exist"
        ));
        assert!(matches!(
            RepositoryError::for_sqlstate("23514", "set tip"),
            Some(RepositoryError::Invalid(_))
        ));
        assert!(RepositoryError::for_sqlstate("40001", "set tip").is_none());
    }

    #[test]
    fn test_non_database_error_is_not_a_constraint() {
        assert!(matches!(
            RepositoryError::from_constraint(sqlx::Error::RowNotFound, "create employee"),
            RepositoryError::Database(_)
        ));
    }

    #[test]
    fn test_expect_single_row() {
        assert!(expect_single_row(1, "close order").is_ok());
        assert!(matches!(
            expect_single_row(0, "close order"),
            Err(RepositoryError::Conflict(_))
        ));
        assert!(matches!(
            expect_single_row(2, "close order"),
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}
