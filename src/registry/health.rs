//! Periodic liveness checking of registered peers.
//!
//! Each round snapshots the store, probes every entry concurrently (each
//! probe bounded by its own timeout) and reports the result back to the
//! store, which owns the failure counters and performs evictions. The
//! monitor never holds an entry itself.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use super::store::{FailureOutcome, RegistryStore};
use crate::background::BackgroundTask;
use crate::config::HealthConfig;
use crate::directory::Address;
use crate::transport;

/// A liveness check against one address. `Ok` means alive.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, address: &Address) -> Result<()>;
}

/// Probes through the peer's own transport, see [`transport::probe`].
pub struct TransportProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl TransportProbe {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl HealthProbe for TransportProbe {
    async fn probe(&self, address: &Address) -> Result<()> {
        transport::probe(&self.client, address, self.timeout).await
    }
}

/// Totals for one probing round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub alive: usize,
    pub failed: usize,
    pub evicted: Vec<String>,
}

enum Verdict {
    Alive,
    Failed,
    Evicted(String),
}

pub struct HealthMonitor {
    store: Arc<RegistryStore>,
    probe: Arc<dyn HealthProbe>,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(store: Arc<RegistryStore>, probe: Arc<dyn HealthProbe>, config: HealthConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            probe,
            config,
        })
    }

    /// Runs one round over the current directory.
    pub async fn check_all(&self) -> RoundReport {
        let snapshot = self.store.list();
        if snapshot.is_empty() {
            return RoundReport::default();
        }

        tracing::debug!("Checking health of {} users", snapshot.len());

        let verdicts: Vec<Verdict> = futures::stream::iter(snapshot)
            .map(|(name, address)| self.check_one(name, address))
            .buffer_unordered(self.config.max_concurrent_probes.max(1))
            .collect()
            .await;

        let mut report = RoundReport::default();
        for verdict in verdicts {
            match verdict {
                Verdict::Alive => report.alive += 1,
                Verdict::Failed => report.failed += 1,
                Verdict::Evicted(name) => {
                    report.failed += 1;
                    report.evicted.push(name);
                }
            }
        }

        tracing::debug!(
            "Health round done: {} alive, {} failed, {} evicted; {} users remain",
            report.alive,
            report.failed,
            report.evicted.len(),
            self.store.len()
        );

        report
    }

    async fn check_one(&self, name: String, address: Address) -> Verdict {
        let alive = match tokio::time::timeout(self.config.probe_timeout, self.probe.probe(&address)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!("Probe of {} at {} failed: {}", name, address, e);
                false
            }
            Err(_) => {
                tracing::debug!("Probe of {} at {} timed out", name, address);
                false
            }
        };

        if alive {
            self.store.record_success(&name, &address);
            return Verdict::Alive;
        }

        match self
            .store
            .record_failure(&name, &address, self.config.eviction_threshold)
        {
            FailureOutcome::Evicted => {
                tracing::info!(
                    "Evicted {} at {} after more than {} failed checks",
                    name,
                    address,
                    self.config.eviction_threshold
                );
                Verdict::Evicted(name)
            }
            FailureOutcome::Counted(failures) => {
                tracing::debug!("{} failed {} consecutive checks", name, failures);
                Verdict::Failed
            }
            FailureOutcome::Stale => Verdict::Failed,
        }
    }

    /// Starts the periodic loop; the first round runs one period from now.
    pub fn spawn(self: Arc<Self>) -> BackgroundTask {
        tracing::info!(
            "Periodic health checking every {:?} (evict after {} failures)",
            self.config.period,
            self.config.eviction_threshold
        );

        let period = self.config.period;
        BackgroundTask::spawn_periodic("health-monitor", period, move || {
            let monitor = self.clone();
            async move {
                monitor.check_all().await;
            }
        })
    }
}
