//! DreamPOS Core - Shared domain types.
//!
//! This crate provides the types shared by every DreamPOS component:
//! - `server` - HTTP API for staff terminals (auth, orders, reservations, refunds, payments)
//! - `cli` - Command-line tools for migrations and employee management
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. Postgres encodings are available behind the `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, lifecycle statuses, money and phone numbers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
