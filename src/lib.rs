//! Peer Chat Library
//!
//! Named peers find each other through a shared registry and exchange short
//! text messages over HTTP, WebSocket or UDP. This crate holds everything the
//! two binaries (`peer-registry` and `peer-chat`) are built from.
//!
//! ## Modules
//! - **`directory`**: names, protocol-tagged addresses and the message shape.
//! - **`transport`**: one client/server contract with three bindings, plus the
//!   per-protocol liveness probe.
//! - **`registry`**: the concurrent membership store, the health monitor that
//!   evicts dead peers, and the HTTP query surface with its typed client.
//! - **`chat`**: a user's session: directory cache, peer selection and lazily
//!   opened transports.
//! - **`background`**: owned, stoppable handles for every long-running loop.
//! - **`config`** and **`error`**: tunables and the shared error taxonomy.

pub mod background;
pub mod chat;
pub mod config;
pub mod directory;
pub mod error;
pub mod registry;
pub mod transport;
