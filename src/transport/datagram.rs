//! Datagram binding over UDP.
//!
//! Sending is fire-and-forget past the local socket, but never silently
//! dropped on the client: transient socket errors are retried after a fixed
//! backoff for as long as it takes.

use anyhow::Result;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

use super::MessageListener;
use super::codec;
use crate::background::{ServerTask, ShutdownSignal, stopped};
use crate::config::TransportConfig;
use crate::directory::{Address, Message};
use crate::error::{ChatError, ChatResult};

/// One-shot connectionless write of an encoded message.
#[async_trait]
pub trait DatagramWire: Send + Sync {
    async fn send(&self, payload: &[u8]) -> io::Result<()>;
}

/// Resolves the target and writes from a fresh ephemeral socket each time.
pub struct UdpWire {
    target: String,
}

impl UdpWire {
    pub fn new(address: &Address) -> Self {
        Self {
            target: address.authority(),
        }
    }
}

#[async_trait]
impl DatagramWire for UdpWire {
    async fn send(&self, payload: &[u8]) -> io::Result<()> {
        let target = tokio::net::lookup_host(self.target.as_str())
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", self.target))
            })?;

        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;

        let written = socket.send(payload).await?;
        if written < payload.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "truncated datagram"));
        }

        Ok(())
    }
}

/// Errors worth another attempt.
pub fn is_transient(err: &io::Error) -> bool {
    use io::ErrorKind::*;

    matches!(
        err.kind(),
        ConnectionRefused
            | ConnectionReset
            | AddrInUse
            | AddrNotAvailable
            | WouldBlock
            | Interrupted
            | TimedOut
            | HostUnreachable
            | NetworkUnreachable
            | NetworkDown
            | ResourceBusy
    )
}

pub struct DatagramChatClient {
    target: String,
    wire: Arc<dyn DatagramWire>,
    backoff: Duration,
}

impl DatagramChatClient {
    pub fn new(address: &Address, config: &TransportConfig) -> Self {
        Self::with_wire(address, Arc::new(UdpWire::new(address)), config)
    }

    pub fn with_wire(address: &Address, wire: Arc<dyn DatagramWire>, config: &TransportConfig) -> Self {
        Self {
            target: address.to_string(),
            wire,
            backoff: config.datagram_retry_backoff,
        }
    }

    /// Blocks until the datagram left the local socket. Only non-transient
    /// errors end the retry loop early.
    pub async fn send(&self, message: &Message) -> ChatResult<()> {
        let payload = codec::encode_datagram(message).map_err(ChatError::transport)?;
        let mut retries: u64 = 0;

        loop {
            match self.wire.send(&payload).await {
                Ok(()) => {
                    if retries > 0 {
                        tracing::debug!("Datagram to {} sent after {} retries", self.target, retries);
                    }
                    return Ok(());
                }
                Err(e) if is_transient(&e) => {
                    retries += 1;
                    tracing::trace!("Datagram to {} failed ({}), retrying", self.target, e);
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => {
                    tracing::warn!("Datagram to {} failed: {}", self.target, e);
                    return Err(ChatError::transport(e));
                }
            }
        }
    }
}

pub async fn start(host: &str, port: u16, listener: MessageListener) -> Result<ServerTask> {
    let socket = UdpSocket::bind((host, port)).await?;
    let local_addr = socket.local_addr()?;

    Ok(ServerTask::spawn("udp-chat", local_addr, move |signal| {
        receive_loop(socket, listener, signal)
    }))
}

/// One datagram, one message; no ordering or dedup.
async fn receive_loop(socket: UdpSocket, listener: MessageListener, mut signal: ShutdownSignal) {
    let mut buf = vec![0u8; 65536];

    loop {
        tokio::select! {
            _ = stopped(&mut signal) => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, src)) => match codec::decode_datagram(&buf[..len]) {
                    Ok(message) => listener(&message.user, &message.text),
                    Err(e) => {
                        tracing::warn!("Failed to deserialize message from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}
