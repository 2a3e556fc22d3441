//! Reservation lifecycle service.
//!
//! Bookings start `pending` (or whatever status the terminal sends),
//! complete when paid, and can then go through a refund request just like
//! orders. Staff can be chosen explicitly or left to the server with
//! `anyone`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument, warn};

use dreampos_core::{AppointmentStatus, PhoneNumber, ReservationId, ReservationStatus, ServiceId};

use crate::db::{RepositoryError, ReservationRepository};
use crate::models::{
    ANYONE, CreateReservationRequest, NewReservation, RefundContact, Reservation, ReservationCounts,
    ReservationDetail, ReservationFilter, ReservationPatch, ServiceEntry, StaffChoice, StaffEntry,
    UpdateReservationRequest,
};
use crate::services::orders::validate_refund_contact;
use crate::sms::SmsNotifier;

/// Errors from reservation operations.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// Request body failed validation.
    #[error("{0}")]
    Validation(String),

    /// Reservation or service does not exist.
    #[error("reservation not found")]
    NotFound,

    /// Reservation is not in the state the operation needs.
    #[error("{0}")]
    Conflict(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ReservationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            RepositoryError::Invalid(msg) => Self::Validation(msg),
            other => Self::Repository(other),
        }
    }
}

/// Reservation lifecycle operations.
pub struct ReservationService<'a> {
    reservations: ReservationRepository<'a>,
}

impl<'a> ReservationService<'a> {
    /// Create a new reservation service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            reservations: ReservationRepository::new(pool),
        }
    }

    /// List reservations matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ReservationError::Repository` if the query fails.
    pub async fn list(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, ReservationError> {
        Ok(self.reservations.list(filter).await?)
    }

    /// Counts per status within an optional time window.
    ///
    /// # Errors
    ///
    /// Returns `ReservationError::Repository` if the query fails.
    pub async fn counts(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<ReservationCounts, ReservationError> {
        Ok(self.reservations.counts(from, to).await?)
    }

    /// A reservation with the service it books.
    ///
    /// # Errors
    ///
    /// Returns `ReservationError::NotFound` if it does not exist.
    pub async fn get(&self, id: ReservationId) -> Result<ReservationDetail, ReservationError> {
        let reservation = self
            .reservations
            .get(id)
            .await?
            .ok_or(ReservationError::NotFound)?;
        let items = self.reservations.items(id).await?;
        Ok(ReservationDetail { reservation, items })
    }

    /// Bookable services.
    ///
    /// # Errors
    ///
    /// Returns `ReservationError::Repository` if the query fails.
    pub async fn services(&self) -> Result<Vec<ServiceEntry>, ReservationError> {
        Ok(self.reservations.services().await?)
    }

    /// Bookable staff, led by the `anyone` entry.
    ///
    /// # Errors
    ///
    /// Returns `ReservationError::Repository` if the query fails.
    pub async fn staff(&self) -> Result<Vec<StaffEntry>, ReservationError> {
        Ok(with_anyone(self.reservations.staff().await?))
    }

    /// Book a reservation.
    ///
    /// A booking created as `confirmed` sends the customer an SMS from a
    /// detached task; delivery failures are only logged.
    ///
    /// # Errors
    ///
    /// Returns `ReservationError::Validation` for a bad request body.
    /// Returns `ReservationError::NotFound` if the service does not exist.
    /// Returns `ReservationError::Conflict` if no employee can take the booking.
    #[instrument(skip(self, request, notifier))]
    pub async fn create<N>(
        &self,
        request: &CreateReservationRequest,
        notifier: Option<N>,
    ) -> Result<ReservationId, ReservationError>
    where
        N: SmsNotifier + 'static,
    {
        let new = validate_new(request, Utc::now())?;
        let id = self.reservations.create(&new).await?;
        info!(reservation_id = %id, status = %new.status, "Reservation created");

        if new.status == AppointmentStatus::Confirmed
            && let Some(notifier) = notifier
        {
            match self.reservations.get(id).await {
                Ok(Some(reservation)) => {
                    tokio::spawn(async move {
                        if let Err(e) = notifier.send_reservation_confirmation(&reservation).await {
                            warn!(reservation_id = %reservation.id, error = %e, "Confirmation SMS failed");
                        }
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(reservation_id = %id, error = %e, "Could not load reservation for SMS"),
            }
        }

        Ok(id)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `ReservationError::Validation` for a bad or empty patch.
    /// Returns `ReservationError::NotFound` if the reservation does not exist.
    /// Returns `ReservationError::Conflict` if the status change is not allowed
    /// from the current status.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: ReservationId,
        request: &UpdateReservationRequest,
    ) -> Result<(), ReservationError> {
        let patch = validate_patch(request)?;
        if patch.is_empty() {
            return Err(ReservationError::Validation("nothing to update".to_owned()));
        }
        self.reservations.update(id, &patch).await?;
        Ok(())
    }

    /// Ask for a refund on a `completed` reservation.
    ///
    /// # Errors
    ///
    /// Returns `ReservationError::Validation` for missing contact details.
    /// Returns `ReservationError::Conflict` if the reservation is not completed.
    #[instrument(skip(self, contact))]
    pub async fn request_refund(
        &self,
        id: ReservationId,
        contact: &RefundContact,
    ) -> Result<(), ReservationError> {
        validate_refund_contact(contact).map_err(ReservationError::Validation)?;
        self.reservations.request_refund(id, contact).await?;
        info!(reservation_id = %id, "Refund requested");
        Ok(())
    }

    /// Withdraw a pending refund request.
    ///
    /// # Errors
    ///
    /// Returns `ReservationError::Conflict` if there is no withdrawable request.
    #[instrument(skip(self))]
    pub async fn cancel_refund(&self, id: ReservationId) -> Result<(), ReservationError> {
        self.reservations.cancel_refund(id).await?;
        info!(reservation_id = %id, "Refund request withdrawn");
        Ok(())
    }
}

/// Prefix the staff list with an `anyone` entry offering every service
/// someone performs. Without bookable services the list is returned as is.
#[must_use]
pub fn with_anyone(staff: Vec<StaffEntry>) -> Vec<StaffEntry> {
    let services: BTreeSet<ServiceId> = staff.iter().flat_map(|s| s.services.iter().copied()).collect();
    if services.is_empty() {
        return staff;
    }

    let mut entries = Vec::with_capacity(staff.len() + 1);
    entries.push(StaffEntry {
        id: ANYONE.to_owned(),
        name: "Anyone".to_owned(),
        role: "Any".to_owned(),
        services: services.into_iter().collect(),
    });
    entries.extend(staff);
    entries
}

fn parse_status(raw: &str) -> Result<AppointmentStatus, ReservationError> {
    let status: ReservationStatus = raw
        .parse()
        .map_err(|e: dreampos_core::ParseStatusError| ReservationError::Validation(e.to_string()))?;
    match status {
        ReservationStatus::Completed => Err(ReservationError::Validation(format!(
            "status {status} is set by payment"
        ))),
        ReservationStatus::RefundPending | ReservationStatus::Refunded => {
            Err(ReservationError::Validation(format!(
                "status {status} is set by the refund workflow"
            )))
        }
        _ => Ok(status.to_storage()),
    }
}

fn parse_phone(raw: &str) -> Result<PhoneNumber, ReservationError> {
    PhoneNumber::parse(raw).map_err(|e| ReservationError::Validation(format!("customerPhone: {e}")))
}

fn parse_service(raw: &str) -> Result<ServiceId, ReservationError> {
    raw.parse()
        .map_err(|_| ReservationError::Validation(format!("serviceId: invalid value {raw:?}")))
}

fn parse_staff(raw: Option<&str>) -> Result<StaffChoice, ReservationError> {
    StaffChoice::parse(raw).map_err(|e| ReservationError::Validation(format!("staffId: {e}")))
}

fn non_blank(field: &str, value: &str) -> Result<String, ReservationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ReservationError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_owned())
}

/// Validate a booking request, filling in `now` and `pending` defaults.
fn validate_new(
    request: &CreateReservationRequest,
    now: DateTime<Utc>,
) -> Result<NewReservation, ReservationError> {
    let customer_name = non_blank("customerName", request.customer_name.as_deref().unwrap_or_default())?;
    let customer_phone = parse_phone(
        &non_blank("customerPhone", request.customer_phone.as_deref().unwrap_or_default())?,
    )?;
    let service_id = parse_service(&non_blank(
        "serviceId",
        request.service_id.as_deref().unwrap_or_default(),
    )?)?;

    Ok(NewReservation {
        customer_name,
        customer_phone,
        staff: parse_staff(request.staff_id.as_deref())?,
        service_id,
        appointment_at: request.datetime.unwrap_or(now),
        status: request
            .status
            .as_deref()
            .map(parse_status)
            .transpose()?
            .unwrap_or(AppointmentStatus::Pending),
    })
}

fn validate_patch(request: &UpdateReservationRequest) -> Result<ReservationPatch, ReservationError> {
    Ok(ReservationPatch {
        customer_name: request
            .customer_name
            .as_deref()
            .map(|n| non_blank("customerName", n))
            .transpose()?,
        customer_phone: request.customer_phone.as_deref().map(parse_phone).transpose()?,
        staff: request
            .staff_id
            .as_deref()
            .map(|s| parse_staff(Some(s)))
            .transpose()?,
        service_id: request.service_id.as_deref().map(parse_service).transpose()?,
        appointment_at: request.datetime,
        status: request.status.as_deref().map(parse_status).transpose()?,
    })
}
