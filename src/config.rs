//! Runtime tunables.
//!
//! Nothing here is parsed from disk: the binaries fill these from their
//! command-line flags and everything else takes the defaults.

use std::time::Duration;

pub const DEFAULT_REGISTRY_PORT: u16 = 8088;
pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:8088";

/// Health monitor policy.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Time between two probing rounds.
    pub period: Duration,
    /// An entry is evicted once its consecutive failures exceed this.
    pub eviction_threshold: u32,
    /// Upper bound for a single probe.
    pub probe_timeout: Duration,
    /// Probes in flight at once within a round.
    pub max_concurrent_probes: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(120),
            eviction_threshold: 3,
            probe_timeout: Duration::from_secs(5),
            max_concurrent_probes: 32,
        }
    }
}

/// Client and server transport timings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound for one HTTP request (message POST, health check, registry call).
    pub request_timeout: Duration,
    /// Bound for opening a WebSocket.
    pub connect_timeout: Duration,
    /// Pause between two datagram attempts after a transient socket error.
    pub datagram_retry_backoff: Duration,
    /// How long `stop()` waits for a server to drain before aborting it.
    pub stop_grace: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            datagram_retry_backoff: Duration::from_millis(50),
            stop_grace: Duration::from_secs(2),
        }
    }
}

/// Chat session policy.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Background directory refresh interval.
    pub refresh_period: Duration,
    pub transport: TransportConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_period: Duration::from_secs(120),
            transport: TransportConfig::default(),
        }
    }
}
