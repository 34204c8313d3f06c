//! Endpoint paths and small DTOs shared by the chat servers, the registry and
//! their clients.

use serde::{Deserialize, Serialize};

pub const ENDPOINT_HEALTH: &str = "/v1/health";
pub const ENDPOINT_MESSAGE: &str = "/v1/message";
pub const ENDPOINT_WS_MESSAGE: &str = "/v1/ws/message";
/// Bare WebSocket endpoint: accepts and closes, used for liveness probes.
pub const ENDPOINT_WS_PROBE: &str = "/";

/// Body of every health endpoint.
pub const ALIVE_TOKEN: &str = "OK";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    pub fn error() -> Self {
        Self {
            status: "error".to_string(),
        }
    }
}
