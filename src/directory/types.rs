use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::ChatError;

static USER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\-_.]+$").expect("user name pattern is valid"));

/// Returns `true` when `name` is a legal peer name.
pub fn check_user_name(name: &str) -> bool {
    USER_NAME.is_match(name)
}

static HOST_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]*[a-zA-Z0-9])\.)*([A-Za-z0-9]|[A-Za-z0-9][A-Za-z0-9\-]*[A-Za-z0-9])$")
        .expect("host name pattern is valid")
});

/// Returns `true` for an IP literal or a DNS host name.
pub fn check_host(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok() || HOST_NAME.is_match(host)
}

/// The wire protocol a peer's chat server speaks.
///
/// The set is closed: every transport binding and every health probe
/// dispatches on this discriminant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// Request/response: one HTTP POST per message.
    Http,
    /// Persistent stream: one WebSocket per destination.
    #[serde(rename = "WEBSOCKET")]
    WebSocket,
    /// Best-effort datagrams.
    Udp,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::WebSocket => "ws",
            Protocol::Udp => "udp",
        }
    }

    /// Port used by the chat binary when none is given.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => 8080,
            Protocol::WebSocket => 8082,
            Protocol::Udp => 3000,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Http => "HTTP",
            Protocol::WebSocket => "WEBSOCKET",
            Protocol::Udp => "UDP",
        };
        f.write_str(name)
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HTTP" => Ok(Protocol::Http),
            "WEBSOCKET" | "WS" => Ok(Protocol::WebSocket),
            "UDP" => Ok(Protocol::Udp),
            other => Err(format!("Invalid protocol: {}", other)),
        }
    }
}

/// A network address tagged with the protocol spoken there.
///
/// Renders as `scheme://host:port`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Address {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
        }
    }

    /// Rejects empty hosts and port 0.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.host.trim().is_empty() {
            return Err(ChatError::InvalidAddress(format!("{} (empty host)", self)));
        }
        if self.port == 0 {
            return Err(ChatError::InvalidAddress(format!("{} (port out of range)", self)));
        }
        Ok(())
    }

    /// `true` for wildcard hosts such as `0.0.0.0`, which peers cannot dial.
    pub fn is_unspecified(&self) -> bool {
        self.host
            .trim_matches(|c| c == '[' || c == ']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_unspecified())
    }

    /// `host:port`, suitable for socket resolution.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol.scheme(), self.authority())
    }
}

/// A peer name bound to the address its chat server listens on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub address: Address,
}

impl UserRecord {
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// One chat message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Sender name.
    pub user: String,
    pub text: String,
}

impl Message {
    pub fn new(user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            text: text.into(),
        }
    }
}
