//! Refund request repository.
//!
//! Orders and reservations keep their open refund requests in two tables
//! with the same shape. [`Tables`] names the statements that differ so every
//! operation here is written once and parameterized over the parent kind.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use dreampos_core::{
    PaymentId, PaymentMethod, PaymentStatus, RefundRequestStatus, RefundType,
    cents_to_major, display_currency,
};

use super::{RepositoryError, expect_single_row};
use crate::models::{PendingRefund, RefundParent, RefundRecord, RefundablePayment};
use crate::services::refunds::RefundStore;

/// Table and column names for one kind of refund parent.
struct Tables {
    kind: RefundType,
    /// Refund metadata table.
    meta: &'static str,
    /// Metadata column holding the parent id.
    meta_key: &'static str,
    /// Parent table.
    parent: &'static str,
    /// `payment` column referencing the parent.
    payment_key: &'static str,
    /// Parent status a disapproved request returns to.
    restored_status: &'static str,
}

const ORDER_TABLES: Tables = Tables {
    kind: RefundType::Order,
    meta: "refund_data",
    meta_key: "order_id",
    parent: "order_data",
    payment_key: "order_id",
    restored_status: "CLOSED",
};

const RESERVATION_TABLES: Tables = Tables {
    kind: RefundType::Reservation,
    meta: "reservation_refund_data",
    meta_key: "appointment_id",
    parent: "appointment",
    payment_key: "reservation_id",
    restored_status: "COMPLETED",
};

const fn tables_for(refund_type: RefundType) -> &'static Tables {
    match refund_type {
        RefundType::Order => &ORDER_TABLES,
        RefundType::Reservation => &RESERVATION_TABLES,
    }
}

impl Tables {
    /// Best payment for the parent: completed first, then newest.
    fn best_payment_join(&self) -> String {
        format!(
            r"
            LEFT JOIN LATERAL (
                SELECT id, amount, TRIM(currency) AS currency, payment_method, status,
                       stripe_payment_intent_id, stripe_refund_id
                FROM payment
                WHERE {payment_key} = m.{meta_key}
                ORDER BY (status = 'completed') DESC, created_at DESC, id DESC
                LIMIT 1
            ) p ON TRUE",
            payment_key = self.payment_key,
            meta_key = self.meta_key,
        )
    }

    /// Open requests whose parent is `REFUND_PENDING`.
    fn pending_select(&self) -> String {
        format!(
            r"
            SELECT m.{key} AS id, '{kind}' AS refund_type, m.reason, m.status,
                   m.requested_at, m.processed_at,
                   p.amount, p.currency, p.stripe_refund_id
            FROM {meta} m
            JOIN {parent} par ON par.id = m.{key} AND par.status = 'REFUND_PENDING'
            {payment}",
            key = self.meta_key,
            kind = self.kind,
            meta = self.meta,
            parent = self.parent,
            payment = self.best_payment_join(),
        )
    }
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    id: i64,
    refund_type: String,
    reason: String,
    status: RefundRequestStatus,
    requested_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    amount: Option<i64>,
    currency: Option<String>,
    stripe_refund_id: Option<String>,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    status: RefundRequestStatus,
    payment_id: Option<PaymentId>,
    amount: Option<i64>,
    currency: Option<String>,
    payment_method: Option<PaymentMethod>,
    payment_status: Option<PaymentStatus>,
    stripe_payment_intent_id: Option<String>,
}

/// Repository for refund request database operations.
#[derive(Clone, Copy)]
pub struct RefundRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RefundRepository<'a> {
    /// Create a new refund repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All open refund requests across orders and reservations, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a row carries an unknown refund type.
    #[instrument(skip(self))]
    pub async fn list_pending(&self) -> Result<Vec<PendingRefund>, RepositoryError> {
        let sql = format!(
            "{}\nUNION ALL\n{}\nORDER BY requested_at DESC, id DESC",
            ORDER_TABLES.pending_select(),
            RESERVATION_TABLES.pending_select(),
        );

        let rows = sqlx::query_as::<_, PendingRow>(&sql)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter()
            .map(|r| {
                let refund_type: RefundType = r.refund_type.parse().map_err(|e| {
                    RepositoryError::DataCorruption(format!("refund projection: {e}"))
                })?;
                let (order_id, reservation_id) = match RefundParent::new(r.id, refund_type) {
                    RefundParent::Order(id) => (Some(id), None),
                    RefundParent::Reservation(id) => (None, Some(id)),
                };
                Ok(PendingRefund {
                    id: r.id,
                    order_id,
                    reservation_id,
                    refund_type,
                    amount: r.amount.map_or(0.0, cents_to_major),
                    currency: display_currency(r.currency.as_deref()),
                    reason: r.reason,
                    status: r.status,
                    requested_at: r.requested_at,
                    processed_at: r.processed_at,
                    stripe_refund_id: r.stripe_refund_id,
                })
            })
            .collect()
    }

    /// The open request for a parent, if its parent is `REFUND_PENDING`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn find(&self, parent: RefundParent) -> Result<Option<RefundRecord>, RepositoryError> {
        let t = tables_for(parent.refund_type());
        let sql = format!(
            r"
            SELECT m.status, p.id AS payment_id, p.amount, p.currency, p.payment_method,
                   p.status AS payment_status, p.stripe_payment_intent_id
            FROM {meta} m
            JOIN {parent} par ON par.id = m.{key} AND par.status = 'REFUND_PENDING'
            {payment}
            WHERE m.{key} = $1
            ",
            meta = t.meta,
            parent = t.parent,
            key = t.meta_key,
            payment = t.best_payment_join(),
        );

        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(parent.id())
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(|r| {
            let payment = match (r.payment_id, r.amount, r.payment_method, r.payment_status) {
                (Some(id), Some(amount_cents), Some(method), Some(status)) => Some(RefundablePayment {
                    id,
                    amount_cents,
                    currency: r.currency.unwrap_or_default(),
                    method,
                    status,
                    payment_intent_id: r.stripe_payment_intent_id,
                }),
                _ => None,
            };
            RefundRecord {
                parent,
                status: r.status,
                payment,
            }
        }))
    }

    /// Whether the order or reservation exists at all.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn parent_exists(&self, parent: RefundParent) -> Result<bool, RepositoryError> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)",
            tables_for(parent.refund_type()).parent
        );
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(parent.id())
            .fetch_one(self.pool)
            .await?;
        Ok(exists)
    }

    /// `pending | failed -> processing`. Returns whether this call won the claim.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self))]
    pub async fn begin_processing(&self, parent: RefundParent) -> Result<bool, RepositoryError> {
        let t = tables_for(parent.refund_type());
        let sql = format!(
            r"
            UPDATE {meta} SET status = 'processing'
            WHERE {key} = $1
              AND status IN ('pending', 'failed')
              AND EXISTS (SELECT 1 FROM {parent} WHERE id = $1 AND status = 'REFUND_PENDING')
            ",
            meta = t.meta,
            key = t.meta_key,
            parent = t.parent,
        );
        let rows = sqlx::query(&sql)
            .bind(parent.id())
            .execute(self.pool)
            .await?
            .rows_affected();
        Ok(rows == 1)
    }

    /// `processing -> failed`, stamping the attempt time.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the request is no longer processing.
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, parent: RefundParent) -> Result<(), RepositoryError> {
        let t = tables_for(parent.refund_type());
        let sql = format!(
            r"
            UPDATE {meta} SET status = 'failed', processed_at = NOW()
            WHERE {key} = $1 AND status = 'processing'
            ",
            meta = t.meta,
            key = t.meta_key,
        );
        let rows = sqlx::query(&sql)
            .bind(parent.id())
            .execute(self.pool)
            .await?
            .rows_affected();
        expect_single_row(rows, "mark refund failed")
    }

    /// Finish a processing request: parent to `REFUNDED`, metadata removed,
    /// processor refund id stored on the payment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the parent or request moved underneath.
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self))]
    pub async fn complete(
        &self,
        parent: RefundParent,
        payment: Option<PaymentId>,
        processor_refund_id: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let t = tables_for(parent.refund_type());
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            "UPDATE {} SET status = 'REFUNDED' WHERE id = $1 AND status = 'REFUND_PENDING'",
            t.parent
        ))
        .bind(parent.id())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        expect_single_row(rows, "complete refund")?;

        let deleted = sqlx::query(&format!(
            "DELETE FROM {} WHERE {} = $1 AND status = 'processing'",
            t.meta, t.meta_key
        ))
        .bind(parent.id())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        expect_single_row(deleted, "remove refund request")?;

        if let (Some(payment_id), Some(refund_id)) = (payment, processor_refund_id) {
            sqlx::query(
                "UPDATE payment SET stripe_refund_id = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(payment_id)
            .bind(refund_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Reject a pending or failed request: metadata removed, parent restored.
    /// Returns whether this call made the transition.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the parent was not `REFUND_PENDING`.
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self))]
    pub async fn disapprove(&self, parent: RefundParent) -> Result<bool, RepositoryError> {
        let t = tables_for(parent.refund_type());
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(&format!(
            "DELETE FROM {} WHERE {} = $1 AND status IN ('pending', 'failed')",
            t.meta, t.meta_key
        ))
        .bind(parent.id())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if deleted == 0 {
            return Ok(false);
        }
        expect_single_row(deleted, "remove refund request")?;

        let rows = sqlx::query(&format!(
            "UPDATE {} SET status = '{}' WHERE id = $1 AND status = 'REFUND_PENDING'",
            t.parent, t.restored_status
        ))
        .bind(parent.id())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        expect_single_row(rows, "disapprove refund")?;

        tx.commit().await?;
        Ok(true)
    }
}

impl RefundStore for RefundRepository<'_> {
    async fn find(&self, parent: RefundParent) -> Result<Option<RefundRecord>, RepositoryError> {
        RefundRepository::find(self, parent).await
    }

    async fn parent_exists(&self, parent: RefundParent) -> Result<bool, RepositoryError> {
        RefundRepository::parent_exists(self, parent).await
    }

    async fn begin_processing(&self, parent: RefundParent) -> Result<bool, RepositoryError> {
        RefundRepository::begin_processing(self, parent).await
    }

    async fn mark_failed(&self, parent: RefundParent) -> Result<(), RepositoryError> {
        RefundRepository::mark_failed(self, parent).await
    }

    async fn complete(
        &self,
        parent: RefundParent,
        payment: Option<PaymentId>,
        processor_refund_id: Option<&str>,
    ) -> Result<(), RepositoryError> {
        RefundRepository::complete(self, parent, payment, processor_refund_id).await
    }

    async fn disapprove(&self, parent: RefundParent) -> Result<bool, RepositoryError> {
        RefundRepository::disapprove(self, parent).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_match_refund_type() {
        assert_eq!(tables_for(RefundType::Order).meta, "refund_data");
        assert_eq!(tables_for(RefundType::Order).restored_status, "CLOSED");
        assert_eq!(tables_for(RefundType::Reservation).meta_key, "appointment_id");
        assert_eq!(tables_for(RefundType::Reservation).restored_status, "COMPLETED");
    }

    #[test]
    fn test_pending_select_is_scoped_to_refund_pending_parents() {
        let sql = RESERVATION_TABLES.pending_select();
        assert!(sql.contains("FROM reservation_refund_data m"));
        assert!(sql.contains("par.status = 'REFUND_PENDING'"));
        assert!(sql.contains("'reservation' AS refund_type"));
        assert!(sql.contains("WHERE reservation_id = m.appointment_id"));
    }
}
