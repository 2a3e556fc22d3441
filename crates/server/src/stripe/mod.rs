//! Stripe integration for hosted checkout and refunds.
//!
//! This module provides:
//! - [`StripeClient`] for opening and reading checkout sessions and issuing refunds
//! - Wire types for the parts of the Stripe API the POS uses
//! - Webhook signature verification
//!
//! # Flow
//!
//! 1. The terminal asks for a checkout session for an order or reservation
//! 2. The customer pays on the hosted page
//! 3. Stripe calls the webhook and/or the terminal polls `verify`
//! 4. The payment row is completed and the order closed or reservation completed

mod client;
mod error;
mod types;
mod webhook;

pub use client::StripeClient;
pub(crate) use client::is_valid_object_id;
pub use error::StripeError;
pub use types::{CheckoutRequest, CheckoutSession, Event, Refund};
pub use webhook::{SIGNATURE_TOLERANCE_SECS, verify_signature_at};
