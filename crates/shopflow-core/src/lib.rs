//! Cross-cutting helpers shared by every Shopflow service: tracing setup,
//! env-based configuration, health endpoints, request ids, shutdown signals
//! and serde helpers.

pub mod config;
pub mod health;
pub mod middleware;
pub mod serde;
pub mod shutdown;
pub mod tracing;
