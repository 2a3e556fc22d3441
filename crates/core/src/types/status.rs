//! Status enums for orders, reservations, refunds and payments.
//!
//! Storage enums mirror the Postgres enum types one-to-one. The reservation
//! API exposes its own lowercase vocabulary; [`ReservationStatus`] owns the
//! mapping between the two so that no handler matches on raw strings.

use serde::{Deserialize, Serialize};

/// Error returned when a status string matches no known value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value:?}")]
pub struct ParseStatusError {
    /// Name of the status type that failed to parse.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseStatusError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Order lifecycle status.
///
/// `OPEN -> CLOSED -> REFUND_PENDING -> REFUNDED`, or back to `CLOSED` when a
/// refund is disapproved or withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Open,
    Closed,
    RefundPending,
    Refunded,
}

impl OrderStatus {
    /// Storage spelling (`REFUND_PENDING`).
    #[must_use]
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::RefundPending => "REFUND_PENDING",
            Self::Refunded => "REFUNDED",
        }
    }

    /// API spelling (`refund_pending`).
    #[must_use]
    pub const fn as_api_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::RefundPending => "refund_pending",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    /// Accepts either spelling, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            "REFUND_PENDING" => Ok(Self::RefundPending),
            "REFUNDED" => Ok(Self::Refunded),
            _ => Err(ParseStatusError::new("order status", s)),
        }
    }
}

// =============================================================================
// Reservations
// =============================================================================

/// Appointment status as stored in the `appointment_status` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "appointment_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
    RefundPending,
    Refunded,
}

impl AppointmentStatus {
    /// Statuses from which a paid checkout may complete the appointment.
    pub const COMPLETABLE: [Self; 2] = [Self::Pending, Self::Confirmed];

    /// Statuses a direct edit may move from to reach `self`.
    ///
    /// Empty for statuses only payment or the refund workflow may set.
    #[must_use]
    pub const fn edit_sources(self) -> &'static [Self] {
        match self {
            Self::Pending | Self::Confirmed => &[Self::Pending, Self::Confirmed],
            Self::Cancelled => &[Self::Pending, Self::Confirmed, Self::Cancelled],
            Self::NoShow => &[Self::Pending, Self::Confirmed, Self::NoShow],
            Self::Completed | Self::RefundPending | Self::Refunded => &[],
        }
    }

    /// Storage spelling.
    #[must_use]
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::NoShow => "NO_SHOW",
            Self::RefundPending => "REFUND_PENDING",
            Self::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Reservation status as exposed over the API.
///
/// The mapping to [`AppointmentStatus`] is total in both directions:
///
/// | API              | storage          | also accepted on input          |
/// |------------------|------------------|---------------------------------|
/// | `pending`        | `PENDING`        | `RESERVED`                      |
/// | `confirmed`      | `CONFIRMED`      | `SERVING`                       |
/// | `completed`      | `COMPLETED`      | `PAID`                          |
/// | `cancelled`      | `CANCELLED`      | `CANCELED`                      |
/// | `no_show`        | `NO_SHOW`        |                                 |
/// | `refund_pending` | `REFUND_PENDING` |                                 |
/// | `refunded`       | `REFUNDED`       |                                 |
///
/// Legacy spellings only ever appear on input; output always uses the left
/// column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    #[default]
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
    RefundPending,
    Refunded,
}

impl ReservationStatus {
    /// API spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
            Self::RefundPending => "refund_pending",
            Self::Refunded => "refunded",
        }
    }

    /// Storage value for this API status.
    #[must_use]
    pub const fn to_storage(self) -> AppointmentStatus {
        match self {
            Self::Pending => AppointmentStatus::Pending,
            Self::Confirmed => AppointmentStatus::Confirmed,
            Self::Completed => AppointmentStatus::Completed,
            Self::Cancelled => AppointmentStatus::Cancelled,
            Self::NoShow => AppointmentStatus::NoShow,
            Self::RefundPending => AppointmentStatus::RefundPending,
            Self::Refunded => AppointmentStatus::Refunded,
        }
    }

    /// API status for a stored value.
    #[must_use]
    pub const fn from_storage(status: AppointmentStatus) -> Self {
        match status {
            AppointmentStatus::Pending => Self::Pending,
            AppointmentStatus::Confirmed => Self::Confirmed,
            AppointmentStatus::Completed => Self::Completed,
            AppointmentStatus::Cancelled => Self::Cancelled,
            AppointmentStatus::NoShow => Self::NoShow,
            AppointmentStatus::RefundPending => Self::RefundPending,
            AppointmentStatus::Refunded => Self::Refunded,
        }
    }
}

impl From<AppointmentStatus> for ReservationStatus {
    fn from(status: AppointmentStatus) -> Self {
        Self::from_storage(status)
    }
}

impl From<ReservationStatus> for AppointmentStatus {
    fn from(status: ReservationStatus) -> Self {
        status.to_storage()
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = ParseStatusError;

    /// Case-insensitive; accepts API values, storage values and the legacy
    /// spellings listed in the type-level table.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "RESERVED" => Ok(Self::Pending),
            "CONFIRMED" | "SERVING" => Ok(Self::Confirmed),
            "COMPLETED" | "PAID" => Ok(Self::Completed),
            "CANCELLED" | "CANCELED" => Ok(Self::Cancelled),
            "NO_SHOW" => Ok(Self::NoShow),
            "REFUND_PENDING" => Ok(Self::RefundPending),
            "REFUNDED" => Ok(Self::Refunded),
            _ => Err(ParseStatusError::new("reservation status", s)),
        }
    }
}

// =============================================================================
// Refunds
// =============================================================================

/// Which lifecycle a refund request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundType {
    Order,
    Reservation,
}

impl RefundType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Reservation => "reservation",
        }
    }
}

impl std::fmt::Display for RefundType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RefundType {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "order" => Ok(Self::Order),
            "reservation" => Ok(Self::Reservation),
            _ => Err(ParseStatusError::new("refund type", s)),
        }
    }
}

/// State of a refund request that is still open.
///
/// Stored on the refund metadata row. Terminal outcomes (completed,
/// disapproved) delete the row, so they never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "refund_request_status", rename_all = "snake_case")
)]
pub enum RefundRequestStatus {
    #[default]
    Pending,
    /// The processor call is in flight or its outcome is unknown.
    Processing,
    /// The processor rejected the refund; an operator may retry.
    Failed,
}

impl RefundRequestStatus {
    /// Whether an operator may approve or disapprove from this state.
    #[must_use]
    pub const fn is_actionable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl std::fmt::Display for RefundRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Processing => write!(f, "Processing"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Action an operator takes on a refund request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundAction {
    Approve,
    Disapprove,
}

impl std::str::FromStr for RefundAction {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "disapprove" => Ok(Self::Disapprove),
            _ => Err(ParseStatusError::new("refund action", s)),
        }
    }
}

// =============================================================================
// Payments
// =============================================================================

/// Payment row status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a payment was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Stripe,
    Cash,
    Card,
}

impl PaymentMethod {
    /// Refunds for this method go through the external processor.
    #[must_use]
    pub const fn uses_processor(self) -> bool {
        matches!(self, Self::Stripe)
    }
}

// =============================================================================
// Staff roles
// =============================================================================

/// Employee role label from the `role` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Cashier,
    Receptionist,
    Manager,
    Clerk,
    Supplier,
}

impl Role {
    /// Landing-page priority: the first role a user holds decides where login sends them.
    pub const PRIORITY: [Self; 5] = [
        Self::Cashier,
        Self::Receptionist,
        Self::Manager,
        Self::Clerk,
        Self::Supplier,
    ];

    /// Redirect used when no recognized role is held.
    pub const FALLBACK_PATH: &'static str = "/login";

    /// Frontend route this role lands on after login.
    #[must_use]
    pub const fn landing_path(self) -> &'static str {
        match self {
            Self::Cashier => "/newOrder",
            Self::Receptionist => "/newReservation",
            Self::Manager => "/dashboard",
            Self::Clerk => "/stockUpdates",
            Self::Supplier => "/invoiceStatus",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cashier => "CASHIER",
            Self::Receptionist => "RECEPTIONIST",
            Self::Manager => "MANAGER",
            Self::Clerk => "CLERK",
            Self::Supplier => "SUPPLIER",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CASHIER" => Ok(Self::Cashier),
            "RECEPTIONIST" => Ok(Self::Receptionist),
            "MANAGER" => Ok(Self::Manager),
            "CLERK" => Ok(Self::Clerk),
            "SUPPLIER" => Ok(Self::Supplier),
            _ => Err(ParseStatusError::new("role", s)),
        }
    }
}

/// Resolve the post-login redirect for a set of role labels.
///
/// Labels are matched case-insensitively; unknown labels are ignored.
#[must_use]
pub fn redirect_path_for<S: AsRef<str>>(roles: &[S]) -> &'static str {
    let held: Vec<Role> = roles
        .iter()
        .filter_map(|r| r.as_ref().parse().ok())
        .collect();

    Role::PRIORITY
        .into_iter()
        .find(|role| held.contains(role))
        .map_or(Role::FALLBACK_PATH, Role::landing_path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_single_role() {
        assert_eq!(redirect_path_for(&["Manager"]), "/dashboard");
        assert_eq!(redirect_path_for(&["SUPPLIER"]), "/invoiceStatus");
    }

    #[test]
    fn test_redirect_priority_order() {
        assert_eq!(redirect_path_for(&["Receptionist", "Cashier"]), "/newOrder");
        assert_eq!(redirect_path_for(&["clerk", "manager"]), "/dashboard");
    }

    #[test]
    fn test_redirect_fallback() {
        let none: [&str; 0] = [];
        assert_eq!(redirect_path_for(&none), "/login");
        assert_eq!(redirect_path_for(&["JANITOR"]), "/login");
    }

    #[test]
    fn test_reservation_status_table_is_total() {
        let all = [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Completed,
            ReservationStatus::Cancelled,
            ReservationStatus::NoShow,
            ReservationStatus::RefundPending,
            ReservationStatus::Refunded,
        ];
        for status in all {
            assert_eq!(ReservationStatus::from_storage(status.to_storage()), status);
            assert_eq!(status.as_str().parse::<ReservationStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_edits_stay_before_payment() {
        use AppointmentStatus as S;

        assert!(S::Cancelled.edit_sources().contains(&S::Pending));
        assert!(S::NoShow.edit_sources().contains(&S::Confirmed));
        assert!(S::Pending.edit_sources().contains(&S::Confirmed));

        // Paid or refunded appointments cannot be edited back into checkout.
        for target in [S::Pending, S::Confirmed, S::Cancelled, S::NoShow] {
            for settled in [S::Completed, S::RefundPending, S::Refunded] {
                assert!(!target.edit_sources().contains(&settled));
            }
        }
        assert!(!S::Pending.edit_sources().contains(&S::Cancelled));
        assert!(S::Completed.edit_sources().is_empty());
        assert!(S::Refunded.edit_sources().is_empty());
    }

    #[test]
    fn test_reservation_status_legacy_spellings() {
        let cases = [
            ("RESERVED", ReservationStatus::Pending),
            ("serving", ReservationStatus::Confirmed),
            ("PAID", ReservationStatus::Completed),
            ("canceled", ReservationStatus::Cancelled),
            (" no_show ", ReservationStatus::NoShow),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<ReservationStatus>().unwrap(), expected);
        }
        assert!("archived".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn test_reservation_status_serializes_snake_case() {
        let json = serde_json::to_string(&ReservationStatus::RefundPending).unwrap();
        assert_eq!(json, "\"refund_pending\"");
    }

    #[test]
    fn test_order_status_accepts_both_spellings() {
        assert_eq!("refund_pending".parse::<OrderStatus>().unwrap(), OrderStatus::RefundPending);
        assert_eq!("CLOSED".parse::<OrderStatus>().unwrap(), OrderStatus::Closed);
        assert_eq!(OrderStatus::RefundPending.to_string(), "refund_pending");
    }

    #[test]
    fn test_refund_request_status_actionable() {
        assert!(RefundRequestStatus::Pending.is_actionable());
        assert!(RefundRequestStatus::Failed.is_actionable());
        assert!(!RefundRequestStatus::Processing.is_actionable());
        assert_eq!(RefundRequestStatus::Processing.to_string(), "Processing");
    }

    #[test]
    fn test_refund_action_is_exact() {
        assert_eq!("approve".parse::<RefundAction>().unwrap(), RefundAction::Approve);
        assert!("Approve".parse::<RefundAction>().is_err());
        assert!("refund".parse::<RefundAction>().is_err());
    }
}
