//! Domain models for the POS API.
//!
//! These types sit between the database rows in [`crate::db`] and the JSON
//! bodies in [`crate::routes`]. Response types serialize in `camelCase`, the
//! convention the terminal frontend uses.

pub mod order;
pub mod payment;
pub mod refund;
pub mod reservation;
pub mod user;

pub use order::*;
pub use payment::*;
pub use refund::*;
pub use reservation::*;
pub use user::*;
