//! Reservation (appointment) repository.
//!
//! Status changes follow the same guarded-update pattern as orders. Staff
//! assignment is resolved inside the writing transaction so the chosen
//! employee and service location are read from the same snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use dreampos_core::{
    AppointmentStatus, EmployeeId, ReservationId, ServiceId, ServiceLocationId,
};

use super::{RepositoryError, expect_single_row};
use crate::models::{
    AmountDue, NewReservation, RefundContact, Reservation, ReservationCounts, ReservationFilter,
    ReservationPatch, ServiceEntry, StaffChoice, StaffEntry,
};

/// Repository for reservation database operations.
#[derive(Clone, Copy)]
pub struct ReservationRepository<'a> {
    pool: &'a PgPool,
}

const RESERVATION_SELECT: &str = r"
    SELECT
        a.id,
        a.customer_name,
        a.customer_phone,
        a.actioned_by AS staff_id,
        e.first_name || ' ' || e.last_name AS staff_name,
        s.id AS service_id,
        s.name AS service_name,
        a.appointment_at,
        a.status
    FROM appointment a
    JOIN service_location sl ON sl.id = a.service_location_id
    JOIN service s ON s.id = sl.service_id
    JOIN employee e ON e.id = a.actioned_by
";

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: ReservationId,
    customer_name: String,
    customer_phone: String,
    staff_id: EmployeeId,
    staff_name: String,
    service_id: ServiceId,
    service_name: String,
    appointment_at: DateTime<Utc>,
    status: AppointmentStatus,
}

impl From<ReservationRow> for Reservation {
    fn from(r: ReservationRow) -> Self {
        Self {
            id: r.id,
            customer_name: r.customer_name,
            customer_phone: r.customer_phone,
            staff_id: r.staff_id,
            staff_name: r.staff_name,
            service_id: r.service_id,
            service_name: r.service_name,
            datetime: r.appointment_at,
            status: r.status.into(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CountsRow {
    all: i64,
    pending: i64,
    confirmed: i64,
    completed: i64,
    cancelled: i64,
    no_show: i64,
    refund_pending: i64,
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: ServiceId,
    name: String,
    duration: i32,
    price: Decimal,
}

impl From<ServiceRow> for ServiceEntry {
    fn from(r: ServiceRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            duration: r.duration,
            price: r.price,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StaffRow {
    id: EmployeeId,
    name: String,
    role: Option<String>,
    services: Vec<i64>,
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    service_location_id: ServiceLocationId,
    employee_id: EmployeeId,
}

#[derive(sqlx::FromRow)]
struct CurrentAssignmentRow {
    service_id: ServiceId,
    staff_id: EmployeeId,
}

#[derive(sqlx::FromRow)]
struct CheckoutRow {
    status: AppointmentStatus,
    service_name: String,
    total_cents: i64,
    currency: String,
}

/// What a checkout needs to know about a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationCheckout {
    pub status: AppointmentStatus,
    pub service_name: String,
    pub due: AmountDue,
}

/// Escape `%`, `_` and `\` and wrap for a substring `ILIKE`.
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl<'a> ReservationRepository<'a> {
    /// Create a new reservation repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List reservations, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, RepositoryError> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let sql = format!(
            r"{RESERVATION_SELECT}
            WHERE ($1::appointment_status IS NULL OR a.status = $1)
              AND ($2::TIMESTAMPTZ IS NULL OR a.appointment_at >= $2)
              AND ($3::TIMESTAMPTZ IS NULL OR a.appointment_at <= $3)
              AND ($4::TEXT IS NULL
                   OR a.customer_name ILIKE $4
                   OR a.customer_phone ILIKE $4
                   OR s.name ILIKE $4
                   OR (e.first_name || ' ' || e.last_name) ILIKE $4
                   OR a.id::TEXT = $5)
            ORDER BY a.id DESC
            "
        );

        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(filter.status.map(|s| s.to_storage()))
            .bind(filter.from)
            .bind(filter.to)
            .bind(search.map(like_pattern))
            .bind(search)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Reservation::from).collect())
    }

    /// Fetch one reservation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, RepositoryError> {
        let sql = format!("{RESERVATION_SELECT} WHERE a.id = $1");
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Reservation::from))
    }

    /// Current storage status of a reservation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn status(&self, id: ReservationId) -> Result<Option<AppointmentStatus>, RepositoryError> {
        let status = sqlx::query_scalar::<_, AppointmentStatus>(
            "SELECT status FROM appointment WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(status)
    }

    /// Per-status counts, optionally limited to a time window.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn counts(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<ReservationCounts, RepositoryError> {
        let row = sqlx::query_as::<_, CountsRow>(
            r#"
            SELECT
                COUNT(*) AS "all",
                COUNT(*) FILTER (WHERE status = 'PENDING') AS pending,
                COUNT(*) FILTER (WHERE status = 'CONFIRMED') AS confirmed,
                COUNT(*) FILTER (WHERE status = 'COMPLETED') AS completed,
                COUNT(*) FILTER (WHERE status = 'CANCELLED') AS cancelled,
                COUNT(*) FILTER (WHERE status = 'NO_SHOW') AS no_show,
                COUNT(*) FILTER (WHERE status = 'REFUND_PENDING') AS refund_pending
            FROM appointment
            WHERE ($1::TIMESTAMPTZ IS NULL OR appointment_at >= $1)
              AND ($2::TIMESTAMPTZ IS NULL OR appointment_at <= $2)
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.pool)
        .await?;

        Ok(ReservationCounts {
            all: row.all,
            pending: row.pending,
            confirmed: row.confirmed,
            completed: row.completed,
            cancelled: row.cancelled,
            no_show: row.no_show,
            refund_pending: row.refund_pending,
        })
    }

    /// The booked service, priced at the reservation's location.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn items(&self, id: ReservationId) -> Result<Vec<ServiceEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            r"
            SELECT s.id, s.name, s.duration_mins AS duration, sl.price
            FROM appointment a
            JOIN service_location sl ON sl.id = a.service_location_id
            JOIN service s ON s.id = sl.service_id
            WHERE a.id = $1
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(ServiceEntry::from).collect())
    }

    /// Book an appointment, resolving [`StaffChoice::Anyone`] to a concrete employee.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the service does not exist.
    /// Returns `RepositoryError::Conflict` if no matching employee performs the service.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, reservation), fields(service_id = %reservation.service_id))]
    pub async fn create(&self, reservation: &NewReservation) -> Result<ReservationId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let assignment = resolve_assignment(&mut *tx, reservation.service_id, reservation.staff).await?;

        let id = sqlx::query_scalar::<_, ReservationId>(
            r"
            INSERT INTO appointment
                (service_location_id, actioned_by, customer_name, customer_phone, appointment_at, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(assignment.service_location_id)
        .bind(assignment.employee_id)
        .bind(&reservation.customer_name)
        .bind(&reservation.customer_phone)
        .bind(reservation.appointment_at)
        .bind(reservation.status)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "create reservation"))?;

        tx.commit().await?;
        Ok(id)
    }

    /// Apply a partial update.
    ///
    /// Changing the service or staff re-resolves the service location.
    /// A status change is guarded by [`AppointmentStatus::edit_sources`], so
    /// paid or refunded appointments keep their status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the reservation does not exist.
    /// Returns `RepositoryError::Conflict` if the assignment or status change is not allowed.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: ReservationId, patch: &ReservationPatch) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, CurrentAssignmentRow>(
            r"
            SELECT sl.service_id, a.actioned_by AS staff_id
            FROM appointment a
            JOIN service_location sl ON sl.id = a.service_location_id
            WHERE a.id = $1
            FOR UPDATE OF a
            ",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let assignment = if patch.service_id.is_some() || patch.staff.is_some() {
            let service_id = patch.service_id.unwrap_or(current.service_id);
            let staff = patch
                .staff
                .unwrap_or(StaffChoice::Employee(current.staff_id));
            Some(resolve_assignment(&mut *tx, service_id, staff).await?)
        } else {
            None
        };

        let edit_sources: Vec<&str> = patch
            .status
            .map(|target| target.edit_sources().iter().map(|s| s.as_db_str()).collect())
            .unwrap_or_default();

        let rows = sqlx::query(
            r"
            UPDATE appointment SET
                customer_name = COALESCE($2, customer_name),
                customer_phone = COALESCE($3, customer_phone),
                service_location_id = COALESCE($4, service_location_id),
                actioned_by = COALESCE($5, actioned_by),
                appointment_at = COALESCE($6, appointment_at),
                status = COALESCE($7, status)
            WHERE id = $1
              AND ($7::appointment_status IS NULL OR status::TEXT = ANY($8))
            ",
        )
        .bind(id)
        .bind(patch.customer_name.as_deref())
        .bind(patch.customer_phone.as_ref())
        .bind(assignment.as_ref().map(|a| a.service_location_id))
        .bind(assignment.as_ref().map(|a| a.employee_id))
        .bind(patch.appointment_at)
        .bind(patch.status)
        .bind(edit_sources)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "update reservation"))?
        .rows_affected();

        if rows == 0 {
            return Err(classify_miss(&mut *tx, id, "update reservation").await);
        }
        expect_single_row(rows, "update reservation")?;

        tx.commit().await?;
        Ok(())
    }

    /// `PENDING | CONFIRMED -> COMPLETED`, opening a bill. Returns whether
    /// this call made the transition.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self))]
    pub async fn mark_completed(&self, id: ReservationId) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r"
            UPDATE appointment SET status = 'COMPLETED'
            WHERE id = $1 AND status IN ('PENDING', 'CONFIRMED')
            ",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows != 1 {
            return Ok(false);
        }

        sqlx::query("INSERT INTO appointment_bill (appointment_id) VALUES ($1)")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// `COMPLETED -> REFUND_PENDING`, recording who asked and why.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the reservation does not exist.
    /// Returns `RepositoryError::Conflict` if the reservation is not `COMPLETED`.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, contact))]
    pub async fn request_refund(
        &self,
        id: ReservationId,
        contact: &RefundContact,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r"
            UPDATE appointment SET status = 'REFUND_PENDING'
            WHERE id = $1 AND status = 'COMPLETED'
            ",
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
            INSERT INTO reservation_refund_data (appointment_id, name, phone, email, reason)
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

    /// `REFUND_PENDING -> COMPLETED`, discarding the refund request.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the reservation does not exist.
    /// Returns `RepositoryError::Conflict` if there is no withdrawable request.
    /// Returns `RepositoryError::DataCorruption` if more than one request row existed.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self))]
    pub async fn cancel_refund(&self, id: ReservationId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r"
            UPDATE appointment SET status = 'COMPLETED'
            WHERE id = $1 AND status = 'REFUND_PENDING'
              AND NOT EXISTS (
                  SELECT 1 FROM reservation_refund_data
                  WHERE appointment_id = $1 AND status = 'processing'
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

        let deleted = sqlx::query("DELETE FROM reservation_refund_data WHERE appointment_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted > 1 {
            return Err(RepositoryError::DataCorruption(format!(
                "{deleted} refund rows for reservation {id}"
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Bookable services with their cheapest price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn services(&self) -> Result<Vec<ServiceEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            r"
            SELECT s.id, s.name, s.duration_mins AS duration, MIN(sl.price) AS price
            FROM service s
            JOIN service_location sl ON sl.service_id = s.id
            GROUP BY s.id, s.name, s.duration_mins
            ORDER BY s.name, s.id
            ",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(ServiceEntry::from).collect())
    }

    /// Employees assigned to at least one service, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn staff(&self) -> Result<Vec<StaffEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, StaffRow>(
            r"
            SELECT
                e.id,
                e.first_name || ' ' || e.last_name AS name,
                (SELECT MIN(r.name)
                 FROM employee_role er
                 JOIN role r ON r.id = er.role_id
                 WHERE er.employee_id = e.id) AS role,
                array_agg(DISTINCT sl.service_id ORDER BY sl.service_id) AS services
            FROM employee e
            JOIN service_employee se ON se.employee_id = e.id
            JOIN service_location sl ON sl.id = se.service_location_id
            GROUP BY e.id, e.first_name, e.last_name
            ORDER BY e.id
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StaffEntry {
                id: r.id.to_string(),
                name: r.name,
                role: r.role.unwrap_or_else(|| "Staff".to_owned()),
                services: r.services.into_iter().map(ServiceId::new).collect(),
            })
            .collect())
    }

    /// Status, service name and price of a reservation, in minor units.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn checkout(&self, id: ReservationId) -> Result<Option<ReservationCheckout>, RepositoryError> {
        let row = sqlx::query_as::<_, CheckoutRow>(
            r"
            SELECT a.status, s.name AS service_name,
                   ROUND(sl.price)::BIGINT AS total_cents,
                   TRIM(c.currency) AS currency
            FROM appointment a
            JOIN service_location sl ON sl.id = a.service_location_id
            JOIN service s ON s.id = sl.service_id
            JOIN location l ON l.id = sl.location_id
            JOIN country c ON c.code = l.country_code
            WHERE a.id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| ReservationCheckout {
            status: r.status,
            service_name: r.service_name,
            due: AmountDue {
                cents: r.total_cents,
                currency: r.currency,
            },
        }))
    }
}

/// Pick the service location and employee for a booking.
///
/// `Anyone` takes the lowest employee id able to perform the service; ties
/// across locations go to the lowest service location id.
async fn resolve_assignment(
    conn: &mut PgConnection,
    service_id: ServiceId,
    staff: StaffChoice,
) -> Result<AssignmentRow, RepositoryError> {
    let employee = match staff {
        StaffChoice::Anyone => None,
        StaffChoice::Employee(id) => Some(id),
    };

    let found = sqlx::query_as::<_, AssignmentRow>(
        r"
        SELECT se.service_location_id, se.employee_id
        FROM service_employee se
        JOIN service_location sl ON sl.id = se.service_location_id
        WHERE sl.service_id = $1
          AND ($2::BIGINT IS NULL OR se.employee_id = $2)
        ORDER BY se.employee_id, sl.id
        LIMIT 1
        ",
    )
    .bind(service_id)
    .bind(employee)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(assignment) = found {
        return Ok(assignment);
    }

    let service_exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM service WHERE id = $1)")
        .bind(service_id)
        .fetch_one(&mut *conn)
        .await?;

    if service_exists {
        Err(RepositoryError::Conflict(match employee {
            Some(id) => format!("employee {id} does not perform service {service_id}"),
            None => format!("no employee performs service {service_id}"),
        }))
    } else {
        Err(RepositoryError::NotFound)
    }
}

/// Decide why a guarded reservation update matched nothing.
async fn classify_miss(conn: &mut PgConnection, id: ReservationId, transition: &str) -> RepositoryError {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM appointment WHERE id = $1)")
        .bind(id)
        .fetch_one(conn)
        .await;

    match exists {
        Ok(true) => RepositoryError::Conflict(format!(
            "{transition}: reservation {id} is not in the expected state"
        )),
        Ok(false) => RepositoryError::NotFound,
        Err(e) => RepositoryError::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ann"), "%ann%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
