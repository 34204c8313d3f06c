//! Chat Session Controller
//!
//! Ties the directory and the transports together for one user: pull the
//! peer list, pick a target, push messages to it over whatever protocol the
//! target registered with. Inbound messages never pass through here; they go
//! straight from the local `ChatServer` to its listener.

pub mod session;

pub use session::{ChatSession, DirectoryUpdate};
