//! Business logic services.
//!
//! # Services
//!
//! - `token` - Session and CSRF token issuance and verification
//! - `auth` - Staff login and session validation
//! - `orders` - Order lifecycle
//! - `reservations` - Reservation lifecycle and staff assignment
//! - `refunds` - Approve/disapprove workflow across orders and reservations
//! - `payments` - Checkout sessions and payment confirmation
//!
//! Services that talk to the payment processor or need in-memory fakes in
//! tests are generic over a small store trait; the `db` repositories
//! implement those traits.

pub mod auth;
pub mod orders;
pub mod payments;
pub mod refunds;
pub mod reservations;
pub mod token;
