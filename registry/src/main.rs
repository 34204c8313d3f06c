use clap::Parser;
use peer_chat::config::{DEFAULT_REGISTRY_PORT, HealthConfig, TransportConfig};
use peer_chat::registry::{HealthMonitor, RegistryStore, TransportProbe, server};
use std::sync::Arc;
use std::time::Duration;

/// Presence registry for peer-chat.
#[derive(Parser, Debug)]
#[command(name = "peer-registry", version, about = "Shared user directory with periodic health checks")]
struct Args {
    /// Hostname or IP to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_REGISTRY_PORT)]
    port: u16,

    /// Seconds between two health-check rounds
    #[arg(long, default_value_t = 120)]
    health_period: u64,

    /// Consecutive failed checks tolerated before a user is evicted
    #[arg(long, default_value_t = 3)]
    eviction_threshold: u32,

    /// Seconds a single health probe may take
    #[arg(long, default_value_t = 5)]
    probe_timeout: u64,

    /// Probes in flight at once
    #[arg(long, default_value_t = 32)]
    max_concurrent_probes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let health = HealthConfig {
        period: Duration::from_secs(args.health_period.max(1)),
        eviction_threshold: args.eviction_threshold,
        probe_timeout: Duration::from_secs(args.probe_timeout.max(1)),
        max_concurrent_probes: args.max_concurrent_probes.max(1),
    };
    let transport = TransportConfig::default();

    let store = Arc::new(RegistryStore::new());

    let registry = server::start(&args.host, args.port, store.clone()).await?;
    tracing::info!("Registry listening on {}", registry.local_addr());

    let probe = Arc::new(TransportProbe::new(reqwest::Client::new(), health.probe_timeout));
    let monitor = HealthMonitor::new(store, probe, health).spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    monitor.stop().await;
    registry.stop(transport.stop_grace).await;

    Ok(())
}
