//! Presence Registry
//!
//! The shared directory peers register with, plus the background health
//! monitor that keeps it honest.
//!
//! ## Core Mechanisms
//! - **Store**: a concurrent name → address table; every mutation is atomic
//!   per name. Nothing outside the store touches an entry directly.
//! - **Health checking**: every period each entry is probed through its own
//!   transport. Consecutive failures are counted in the store and an entry
//!   is evicted once the count exceeds the threshold; one success resets it.
//! - **Query surface**: HTTP routes (`/v1/users`, `/v1/health`) and a typed
//!   client used by chat sessions.

pub mod client;
pub mod handlers;
pub mod health;
pub mod protocol;
pub mod server;
pub mod store;

pub use client::{DirectoryQuery, RegistryClient};
pub use health::{HealthMonitor, HealthProbe, TransportProbe};
pub use store::RegistryStore;

#[cfg(test)]
mod tests;
