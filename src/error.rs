//! Error taxonomy shared by the registry, the transports and the chat session.
//!
//! None of these are fatal: callers turn them into log lines or console
//! messages and keep running.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Illegal user name: {0:?}")]
    InvalidName(String),

    #[error("Illegal address: {0}")]
    InvalidAddress(String),

    #[error("User already registered: {0}")]
    DuplicateName(String),

    #[error("Unknown user '{0}'")]
    UnknownPeer(String),

    #[error("User not selected. Use :user command")]
    NoPeerSelected,

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),
}

impl ChatError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::TransportFailure(err.to_string())
    }

    pub fn directory(err: impl std::fmt::Display) -> Self {
        Self::DirectoryUnavailable(err.to_string())
    }
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;
