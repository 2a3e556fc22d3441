//! Staff identity types.
//!
//! These types represent validated domain objects separate from database row types.

use serde::{Deserialize, Serialize};

use dreampos_core::{BusinessId, EmployeeId, LocationId};

/// Credential record for one employee.
#[derive(Debug, Clone)]
pub struct UserDetails {
    /// Employee ID.
    pub id: EmployeeId,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Role labels as stored (`MANAGER`, `CASHIER`, ...).
    pub roles: Vec<String>,
}

/// The authenticated employee attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Employee ID.
    pub id: EmployeeId,
    /// Login name.
    pub username: String,
    /// Role labels.
    pub roles: Vec<String>,
}

/// A location belonging to the employee's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub id: LocationId,
    pub name: String,
}

/// Business the employee works for, returned with a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessInfo {
    pub id: BusinessId,
    /// Ordered by name.
    pub locations: Vec<LocationInfo>,
}

/// Input for provisioning an employee from the command line.
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub business_id: BusinessId,
    pub roles: Vec<String>,
}
