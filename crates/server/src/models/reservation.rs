//! Reservation (appointment) types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dreampos_core::{
    AppointmentStatus, EmployeeId, PhoneNumber, ReservationId, ReservationStatus, ServiceId,
};

/// Staff id value that asks the server to pick an employee.
pub const ANYONE: &str = "anyone";

/// Filter for listing reservations.
#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub status: Option<ReservationStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive substring over customer, service and staff.
    pub search: Option<String>,
}

/// A reservation as shown to the terminal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    pub customer_name: String,
    pub customer_phone: String,
    pub staff_id: EmployeeId,
    pub staff_name: String,
    pub service_id: ServiceId,
    pub service_name: String,
    pub datetime: DateTime<Utc>,
    pub status: ReservationStatus,
}

/// A reservation together with the service it books.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationDetail {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub items: Vec<ServiceEntry>,
}

/// Per-status reservation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReservationCounts {
    pub all: i64,
    pub pending: i64,
    pub confirmed: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub no_show: i64,
    pub refund_pending: i64,
}

/// A bookable service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub id: ServiceId,
    pub name: String,
    /// Minutes.
    pub duration: i32,
    /// Cheapest price across locations, minor units.
    pub price: Decimal,
}

/// An employee who can be booked, with the services they perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffEntry {
    /// Employee id, or [`ANYONE`] for the synthetic entry.
    pub id: String,
    pub name: String,
    pub role: String,
    pub services: Vec<ServiceId>,
}

/// Which employee a booking goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffChoice {
    /// Resolve to the lowest-id employee able to perform the service.
    Anyone,
    Employee(EmployeeId),
}

impl StaffChoice {
    /// Interpret a raw `staffId`. Absent, blank and `anyone` all mean [`StaffChoice::Anyone`].
    ///
    /// # Errors
    ///
    /// Returns the parse error for anything else that is not a valid id.
    pub fn parse(raw: Option<&str>) -> Result<Self, dreampos_core::ParseIdError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::Anyone),
            Some(s) if s.eq_ignore_ascii_case(ANYONE) => Ok(Self::Anyone),
            Some(s) => s.parse().map(Self::Employee),
        }
    }
}

/// Body of `POST /api/reservation`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub staff_id: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Body of `PUT /api/reservation/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReservationRequest {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub staff_id: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
}

/// A validated booking, ready to insert.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub customer_name: String,
    pub customer_phone: PhoneNumber,
    pub staff: StaffChoice,
    pub service_id: ServiceId,
    pub appointment_at: DateTime<Utc>,
    pub status: AppointmentStatus,
}

/// A validated partial update.
#[derive(Debug, Clone, Default)]
pub struct ReservationPatch {
    pub customer_name: Option<String>,
    pub customer_phone: Option<PhoneNumber>,
    pub staff: Option<StaffChoice>,
    pub service_id: Option<ServiceId>,
    pub appointment_at: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
}

impl ReservationPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.customer_name.is_none()
            && self.customer_phone.is_none()
            && self.staff.is_none()
            && self.service_id.is_none()
            && self.appointment_at.is_none()
            && self.status.is_none()
    }
}
