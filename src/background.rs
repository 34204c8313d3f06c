//! Owned background work.
//!
//! Every long-running loop in the crate (health monitor, directory refresh,
//! server accept loops) is spawned through one of the two handles below, so
//! its owner can stop it explicitly instead of leaving it to the runtime.
//!
//! - [`BackgroundTask`]: a periodic loop. `stop()` never interrupts an
//!   iteration that is already running.
//! - [`ServerTask`]: an accept loop. `stop()` signals shutdown, waits a grace
//!   period for in-flight work, then aborts; the listener is dropped before
//!   it returns.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Receiving side of a stop signal, handed to the spawned loop.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Resolves once shutdown was requested or the owner went away.
pub async fn stopped(signal: &mut ShutdownSignal) {
    let _ = signal.wait_for(|stop| *stop).await;
}

pub struct BackgroundTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Runs `tick` every `period`, the first time one period after spawning.
    pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut signal) = watch::channel(false);

        let handle = tokio::spawn(async move {
            tracing::info!("{} started (period {:?})", name, period);

            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // The tick branch body runs to completion: a stop request is
                // only observed between iterations.
                tokio::select! {
                    _ = interval.tick() => tick().await,
                    _ = stopped(&mut signal) => break,
                }
            }

            tracing::info!("{} stopped", name);
        });

        Self {
            name,
            shutdown,
            handle,
        }
    }

    /// Requests a stop and waits for the current iteration to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!("{} terminated abnormally: {}", self.name, e);
        }
    }
}

pub struct ServerTask {
    name: &'static str,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ServerTask {
    /// Spawns `serve`, which must return once its [`ShutdownSignal`] fires.
    pub fn spawn<F, Fut>(name: &'static str, local_addr: SocketAddr, serve: F) -> Self
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, signal) = watch::channel(false);
        let handle = tokio::spawn(serve(signal));

        tracing::info!("{} listening on {}", name, local_addr);

        Self {
            name,
            local_addr,
            shutdown,
            handle,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn stop(self, grace: Duration) {
        let _ = self.shutdown.send(true);

        let mut handle = self.handle;
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("{} terminated abnormally: {}", self.name, e),
            Err(_) => {
                tracing::warn!(
                    "{} did not drain within {:?}, aborting",
                    self.name,
                    grace
                );
                handle.abort();
                let _ = handle.await;
            }
        }

        tracing::info!("{} on {} stopped", self.name, self.local_addr);
    }
}
