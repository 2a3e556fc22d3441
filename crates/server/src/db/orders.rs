//! Order repository.
//!
//! Every status change is a single guarded `UPDATE`. Multi-statement
//! mutations run in one transaction that is rolled back on drop, so an error
//! part-way through leaves nothing behind.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use dreampos_core::{
    EmployeeId, OrderId, OrderItemId, OrderStatus, ProductId, VariationId, cents_to_major,
};

use super::{RepositoryError, expect_single_row};
use crate::models::{
    AmountDue, DEFAULT_ORDER_LIMIT, LineItem, OrderChanges, OrderFilter, OrderItemDetail,
    OrderItemInput, OrderSummary, RefundContact, VariationDetail,
};

/// Repository for order database operations.
#[derive(Clone, Copy)]
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

#[derive(sqlx::FromRow)]
struct OrderSummaryRow {
    id: OrderId,
    created_at: DateTime<Utc>,
    status: OrderStatus,
    currency: String,
    total_cents: i64,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    product_id: ProductId,
    name: String,
    quantity: i32,
    unit_price: Decimal,
    discount: Decimal,
}

#[derive(sqlx::FromRow)]
struct VariationRow {
    order_item_id: OrderItemId,
    id: VariationId,
    name: String,
    price_difference: Decimal,
}

#[derive(sqlx::FromRow)]
struct CheckoutRow {
    status: OrderStatus,
    currency: String,
    total_cents: i64,
    tip_cents: i64,
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    name: String,
    unit_amount: i64,
    quantity: i64,
}

/// What a checkout needs to know about an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCheckout {
    pub status: OrderStatus,
    pub due: AmountDue,
    pub tip_cents: i64,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &OrderFilter) -> Result<Vec<OrderSummary>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderSummaryRow>(
            r"
            SELECT id, created_at, status, TRIM(currency) AS currency,
                   ROUND(total)::BIGINT AS total_cents
            FROM order_detail
            WHERE ($1::BIGINT IS NULL OR id = $1)
              AND ($2::order_status IS NULL OR status = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR created_at <= $4)
            ORDER BY id DESC
            LIMIT $5 OFFSET $6
            ",
        )
        .bind(filter.id)
        .bind(filter.status)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.limit.unwrap_or(DEFAULT_ORDER_LIMIT).max(0))
        .bind(filter.offset.unwrap_or(0).max(0))
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| OrderSummary {
                id: r.id,
                total: cents_to_major(r.total_cents),
                created_at: r.created_at,
                status: r.status,
                currency: r.currency,
            })
            .collect())
    }

    /// Current status of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn status(&self, id: OrderId) -> Result<Option<OrderStatus>, RepositoryError> {
        let status = sqlx::query_scalar::<_, OrderStatus>("SELECT status FROM order_data WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(status)
    }

    /// Open a new order for an employee and apply its first items.
    ///
    /// The order starts `OPEN` with zero tip and discount; its currency comes
    /// from the employee's business, falling back to `USD`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the employee does not exist.
    /// Returns `RepositoryError::Invalid` if an item or variation is unknown.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, changes), fields(items = changes.items.len()))]
    pub async fn create(
        &self,
        employee_id: EmployeeId,
        changes: &OrderChanges,
    ) -> Result<OrderId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, OrderId>(
            r"
            INSERT INTO order_data (employee_id, currency)
            SELECT e.id, COALESCE(
                (SELECT c.currency
                 FROM location l
                 JOIN country c ON c.code = l.country_code
                 WHERE l.business_id = e.business_id
                 ORDER BY l.id
                 LIMIT 1),
                'USD')
            FROM employee e
            WHERE e.id = $1
            RETURNING id
            ",
        )
        .bind(employee_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if let Some(tip) = changes.tip {
            sqlx::query("UPDATE order_data SET tip = $2 WHERE id = $1")
                .bind(id)
                .bind(tip)
                .execute(&mut *tx)
                .await
                .map_err(|e| RepositoryError::from_constraint(e, "set tip"))?;
        }

        apply_items(&mut *tx, id, &changes.items).await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Change items and tip on an `OPEN` order.
    ///
    /// The status guard and every item write happen in one transaction, so a
    /// concurrent close either lands before (and this fails) or after.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    /// Returns `RepositoryError::Conflict` if the order is not `OPEN`.
    /// Returns `RepositoryError::Invalid` if an item or variation is unknown.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, changes), fields(items = changes.items.len()))]
    pub async fn modify(&self, id: OrderId, changes: &OrderChanges) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r"
            UPDATE order_data
            SET tip = COALESCE($2, tip)
            WHERE id = $1 AND status = 'OPEN'
            ",
        )
        .bind(id)
        .bind(changes.tip)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "set tip"))?
        .rows_affected();

        if rows == 0 {
            return Err(classify_miss(&mut *tx, id, "modify order").await);
        }
        expect_single_row(rows, "modify order")?;

        apply_items(&mut *tx, id, &changes.items).await?;

        tx.commit().await?;
        Ok(())
    }

    /// `OPEN -> CLOSED`. Returns whether this call made the transition.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self))]
    pub async fn mark_closed(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let rows = sqlx::query("UPDATE order_data SET status = 'CLOSED' WHERE id = $1 AND status = 'OPEN'")
            .bind(id)
            .execute(self.pool)
            .await?
            .rows_affected();
        Ok(rows == 1)
    }

    /// `CLOSED -> REFUND_PENDING`, recording who asked and why.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    /// Returns `RepositoryError::Conflict` if the order is not `CLOSED`.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, contact))]
    pub async fn request_refund(
        &self,
        id: OrderId,
        contact: &RefundContact,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "UPDATE order_data SET status = 'REFUND_PENDING' WHERE id = $1 AND status = 'CLOSED'",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(classify_miss(&mut *tx, id, "request refund").await);
        }
        expect_single_row(rows, "request refund")?;

        sqlx::query(
            r"
            INSERT INTO refund_data (order_id, name, phone, email, reason)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(id)
        .bind(&contact.name)
        .bind(&contact.phone)
        .bind(&contact.email)
        .bind(&contact.reason)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "record refund request"))?;

        tx.commit().await?;
        Ok(())
    }

    /// `REFUND_PENDING -> CLOSED`, discarding the refund request.
    ///
    /// A request whose processor call is in flight cannot be withdrawn.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    /// Returns `RepositoryError::Conflict` if there is no withdrawable request.
    /// Returns `RepositoryError::DataCorruption` if more than one request row existed.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self))]
    pub async fn cancel_refund(&self, id: OrderId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r"
            UPDATE order_data SET status = 'CLOSED'
            WHERE id = $1 AND status = 'REFUND_PENDING'
              AND NOT EXISTS (
                  SELECT 1 FROM refund_data WHERE order_id = $1 AND status = 'processing'
              )
            ",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(classify_miss(&mut *tx, id, "cancel refund").await);
        }
        expect_single_row(rows, "cancel refund")?;

        let deleted = sqlx::query("DELETE FROM refund_data WHERE order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted > 1 {
            return Err(RepositoryError::DataCorruption(format!(
                "{deleted} refund rows for order {id}"
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Items on an order with their chosen variations.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self))]
    pub async fn items(&self, id: OrderId) -> Result<Vec<OrderItemDetail>, RepositoryError> {
        if self.status(id).await?.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let lines = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT oi.id, oi.item_id AS product_id, i.name, oi.quantity,
                   i.price_per_unit AS unit_price, oi.discount
            FROM order_item oi
            JOIN item i ON i.id = oi.item_id
            WHERE oi.order_id = $1
            ORDER BY oi.id
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let variations = sqlx::query_as::<_, VariationRow>(
            r"
            SELECT oiv.order_item_id, iv.id, iv.name, iv.price_difference
            FROM order_item_variation oiv
            JOIN item_variation iv ON iv.id = oiv.variation_id
            JOIN order_item oi ON oi.id = oiv.order_item_id
            WHERE oi.order_id = $1
            ORDER BY iv.id
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let mut by_line: HashMap<OrderItemId, Vec<VariationDetail>> = HashMap::new();
        for v in variations {
            by_line.entry(v.order_item_id).or_default().push(VariationDetail {
                id: v.id,
                name: v.name,
                price_difference: v.price_difference,
            });
        }

        Ok(lines
            .into_iter()
            .map(|l| OrderItemDetail {
                variations: by_line.remove(&l.id).unwrap_or_default(),
                id: l.id,
                product_id: l.product_id,
                name: l.name,
                quantity: l.quantity,
                unit_price: l.unit_price,
                discount: l.discount,
            })
            .collect())
    }

    /// Status, total and tip of an order, in minor units.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn checkout(&self, id: OrderId) -> Result<Option<OrderCheckout>, RepositoryError> {
        let row = sqlx::query_as::<_, CheckoutRow>(
            r"
            SELECT d.status, TRIM(d.currency) AS currency,
                   ROUND(d.total)::BIGINT AS total_cents,
                   ROUND(od.tip)::BIGINT AS tip_cents
            FROM order_detail d
            JOIN order_data od ON od.id = d.id
            WHERE d.id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| OrderCheckout {
            status: r.status,
            due: AmountDue {
                cents: r.total_cents,
                currency: r.currency,
            },
            tip_cents: r.tip_cents,
        }))
    }

    /// One checkout line per order item, named `item (variation, ...)`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn line_items(&self, id: OrderId) -> Result<Vec<LineItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r"
            SELECT
                i.name || COALESCE(' (' || string_agg(iv.name, ', ' ORDER BY iv.id) || ')', '') AS name,
                GREATEST(
                    ROUND(i.price_per_unit + COALESCE(SUM(iv.price_difference), 0) - oi.discount),
                    0
                )::BIGINT AS unit_amount,
                oi.quantity::BIGINT AS quantity
            FROM order_item oi
            JOIN item i ON i.id = oi.item_id
            LEFT JOIN order_item_variation oiv ON oiv.order_item_id = oi.id
            LEFT JOIN item_variation iv ON iv.id = oiv.variation_id
            WHERE oi.order_id = $1
            GROUP BY oi.id, i.name, i.price_per_unit, oi.discount, oi.quantity
            ORDER BY oi.id
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| LineItem {
                name: r.name,
                unit_amount: r.unit_amount,
                quantity: r.quantity,
            })
            .collect())
    }
}

/// Decide why a guarded order update matched nothing.
async fn classify_miss(conn: &mut PgConnection, id: OrderId, transition: &str) -> RepositoryError {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM order_data WHERE id = $1)")
        .bind(id)
        .fetch_one(conn)
        .await;

    match exists {
        Ok(true) => RepositoryError::Conflict(format!("{transition}: order {id} is not in the expected state")),
        Ok(false) => RepositoryError::NotFound,
        Err(e) => RepositoryError::Database(e),
    }
}

/// Upsert order lines and replace their variation selections.
async fn apply_items(
    conn: &mut PgConnection,
    order_id: OrderId,
    items: &[OrderItemInput],
) -> Result<(), RepositoryError> {
    for item in items {
        let updated = match item.id {
            Some(line_id) => sqlx::query_scalar::<_, OrderItemId>(
                r"
                UPDATE order_item SET item_id = $2, quantity = $3
                WHERE id = $1 AND order_id = $4
                RETURNING id
                ",
            )
            .bind(line_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "update order item"))?,
            None => None,
        };

        let line_id = match updated {
            Some(id) => id,
            None => sqlx::query_scalar::<_, OrderItemId>(
                r"
                INSERT INTO order_item (order_id, item_id, quantity)
                VALUES ($1, $2, $3)
                RETURNING id
                ",
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "insert order item"))?,
        };

        sqlx::query("DELETE FROM order_item_variation WHERE order_item_id = $1")
            .bind(line_id)
            .execute(&mut *conn)
            .await?;

        let mut wanted: Vec<i64> = item.variations.iter().map(|v| v.as_i64()).collect();
        wanted.sort_unstable();
        wanted.dedup();
        if wanted.is_empty() {
            continue;
        }

        let inserted = sqlx::query(
            r"
            INSERT INTO order_item_variation (order_item_id, variation_id)
            SELECT $1, iv.id
            FROM item_variation iv
            WHERE iv.id = ANY($2) AND iv.item_id = $3
            ",
        )
        .bind(line_id)
        .bind(&wanted)
        .bind(item.product_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if usize::try_from(inserted).ok() != Some(wanted.len()) {
            return Err(RepositoryError::Invalid(format!(
                "variations {wanted:?} do not all belong to product {}",
                item.product_id
            )));
        }
    }
    Ok(())
}
