//! Address & Directory Model
//!
//! Value types shared by every other subsystem: the wire [`Protocol`] a peer
//! listens on, the [`Address`] it advertises, the [`UserRecord`] binding a name
//! to that address, and the chat [`Message`] itself.
//!
//! ## Naming rules
//! Peer names are restricted identifiers (`[A-Za-z0-9-_.]+`). The registry
//! rejects anything else before it reaches the store, see [`check_user_name`].

pub mod types;

pub use types::{Address, Message, Protocol, UserRecord, check_host, check_user_name};
