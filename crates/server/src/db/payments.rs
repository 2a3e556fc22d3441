//! Payment repository.
//!
//! One row per checkout attempt, keyed by the processor's session id.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use dreampos_core::{OrderId, PaymentId, PaymentMethod, PaymentStatus, ReservationId};

use super::{OrderRepository, RepositoryError, ReservationRepository};
use crate::models::{NewPayment, Payment, PaymentTarget};
use crate::services::payments::PaymentStore;

/// Repository for payment database operations.
#[derive(Clone, Copy)]
pub struct PaymentRepository<'a> {
    pool: &'a PgPool,
}

const PAYMENT_COLUMNS: &str = r"
    id, order_id, reservation_id, amount, TRIM(currency) AS currency, payment_method,
    stripe_session_id, stripe_payment_intent_id, status, created_at, updated_at
";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: PaymentId,
    order_id: Option<OrderId>,
    reservation_id: Option<ReservationId>,
    amount: i64,
    currency: String,
    payment_method: PaymentMethod,
    stripe_session_id: Option<String>,
    stripe_payment_intent_id: Option<String>,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = RepositoryError;

    fn try_from(r: PaymentRow) -> Result<Self, Self::Error> {
        let target = match (r.order_id, r.reservation_id) {
            (Some(id), None) => PaymentTarget::Order(id),
            (None, Some(id)) => PaymentTarget::Reservation(id),
            _ => {
                return Err(RepositoryError::DataCorruption(format!(
                    "payment {} must reference exactly one order or reservation",
                    r.id
                )));
            }
        };
        Ok(Self {
            id: r.id,
            target,
            amount_cents: r.amount,
            currency: r.currency,
            method: r.payment_method,
            session_id: r.stripe_session_id,
            payment_intent_id: r.stripe_payment_intent_id,
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

impl<'a> PaymentRepository<'a> {
    /// Create a new payment repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a pending payment for a freshly opened checkout session.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the session id is already recorded.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, payment), fields(target = %payment.target))]
    pub async fn create(&self, payment: &NewPayment) -> Result<Payment, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO payment (order_id, reservation_id, amount, currency, payment_method, stripe_session_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PAYMENT_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(payment.target.order_id())
            .bind(payment.target.reservation_id())
            .bind(payment.amount.cents())
            .bind(payment.amount.currency())
            .bind(payment.method)
            .bind(&payment.session_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "record payment"))?;
        row.try_into()
    }

    /// Look up a payment by checkout session id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get_by_session(&self, session_id: &str) -> Result<Option<Payment>, RepositoryError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payment WHERE stripe_session_id = $1");
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(session_id)
            .fetch_optional(self.pool)
            .await?
            .map(Payment::try_from)
            .transpose()
    }

    /// Mark a session's payment completed and remember its payment intent.
    /// Returns whether this call made the change.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self))]
    pub async fn mark_completed(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let rows = sqlx::query(
            r"
            UPDATE payment
            SET status = 'completed',
                stripe_payment_intent_id = COALESCE($2, stripe_payment_intent_id),
                updated_at = NOW()
            WHERE stripe_session_id = $1 AND status <> 'completed'
            ",
        )
        .bind(session_id)
        .bind(payment_intent_id)
        .execute(self.pool)
        .await?
        .rows_affected();
        Ok(rows == 1)
    }

    /// Move a still-pending payment to `status`. Returns whether a row changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self))]
    pub async fn settle_pending(
        &self,
        session_id: &str,
        status: PaymentStatus,
    ) -> Result<bool, RepositoryError> {
        let rows = sqlx::query(
            r"
            UPDATE payment SET status = $2, updated_at = NOW()
            WHERE stripe_session_id = $1 AND status = 'pending'
            ",
        )
        .bind(session_id)
        .bind(status)
        .execute(self.pool)
        .await?
        .rows_affected();
        Ok(rows == 1)
    }
}

impl PaymentStore for PaymentRepository<'_> {
    async fn create(&self, payment: &NewPayment) -> Result<Payment, RepositoryError> {
        PaymentRepository::create(self, payment).await
    }

    async fn get_by_session(&self, session_id: &str) -> Result<Option<Payment>, RepositoryError> {
        PaymentRepository::get_by_session(self, session_id).await
    }

    async fn mark_completed(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        PaymentRepository::mark_completed(self, session_id, payment_intent_id).await
    }

    async fn settle_pending(&self, session_id: &str, status: PaymentStatus) -> Result<bool, RepositoryError> {
        PaymentRepository::settle_pending(self, session_id, status).await
    }

    async fn close_target(&self, target: PaymentTarget) -> Result<bool, RepositoryError> {
        match target {
            PaymentTarget::Order(id) => OrderRepository::new(self.pool).mark_closed(id).await,
            PaymentTarget::Reservation(id) => {
                ReservationRepository::new(self.pool).mark_completed(id).await
            }
        }
    }
}
