//! Core types for DreamPOS.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod money;
pub mod phone;
pub mod status;

pub use id::*;
pub use money::{Money, MoneyError, cents_to_major, display_currency};
pub use phone::{PhoneNumber, PhoneNumberError};
pub use status::*;
