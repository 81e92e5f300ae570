//! Domain types shared by the orders and payments services.
//!
//! This crate contains only pure types with no framework dependencies.
//! The payment contracts in [`payment`] are the JSON bodies carried over the
//! broker, so both services must agree on them.

pub mod id;
pub mod payment;
