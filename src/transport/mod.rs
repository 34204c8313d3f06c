//! Transport Abstraction
//!
//! One contract, three bindings. Callers pick a binding with the peer's
//! [`Protocol`] and never touch the concrete types:
//!
//! | Protocol    | Client `send`                         | Server                        | Probe                  |
//! |-------------|---------------------------------------|-------------------------------|------------------------|
//! | `Http`      | one POST, non-2xx is a failure        | `POST /v1/message`            | `GET /v1/health` = OK  |
//! | `WebSocket` | enqueue; a worker writes in order     | text frames on `/v1/ws/message` | handshake on `/`     |
//! | `Udp`       | one datagram, transient errors retried | one datagram per message      | none (always alive)    |
//!
//! ## Submodules
//! - **`codec`**: the wire encoding, opaque to everything else.
//! - **`protocol`**: endpoint paths and the health token.
//! - **`http`**, **`stream`**, **`datagram`**: the bindings.

pub mod codec;
pub mod datagram;
pub mod http;
pub mod protocol;
pub mod stream;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::background::ServerTask;
use crate::config::TransportConfig;
use crate::directory::{Address, Message, Protocol};
use crate::error::ChatResult;

use datagram::DatagramChatClient;
use http::HttpChatClient;
use stream::StreamChatClient;

/// Delivery callback: `(sender, text)` for every decoded inbound message.
///
/// Called on the binding's receive path, so it should return quickly; a slow
/// listener delays later messages on the same connection or socket.
pub type MessageListener = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Client side of a binding, one per destination.
pub enum ChatClient {
    Http(HttpChatClient),
    Stream(StreamChatClient),
    Datagram(DatagramChatClient),
}

impl ChatClient {
    /// Builds the binding for `address.protocol`. Nothing is dialled yet.
    pub fn connect(address: &Address, client: &reqwest::Client, config: &TransportConfig) -> Self {
        match address.protocol {
            Protocol::Http => ChatClient::Http(HttpChatClient::new(address, client.clone(), config)),
            Protocol::WebSocket => ChatClient::Stream(StreamChatClient::new(address, config)),
            Protocol::Udp => ChatClient::Datagram(DatagramChatClient::new(address, config)),
        }
    }

    pub async fn send(&self, message: &Message) -> ChatResult<()> {
        match self {
            ChatClient::Http(client) => client.send(message).await,
            ChatClient::Stream(client) => client.send(message),
            ChatClient::Datagram(client) => client.send(message).await,
        }
    }
}

/// Server side of a binding. `start` and `stop` are idempotent.
pub struct ChatServer {
    protocol: Protocol,
    host: String,
    port: u16,
    listener: MessageListener,
    stop_grace: Duration,
    running: Option<ServerTask>,
}

impl ChatServer {
    pub fn new(
        protocol: Protocol,
        host: impl Into<String>,
        port: u16,
        listener: MessageListener,
        config: &TransportConfig,
    ) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            listener,
            stop_grace: config.stop_grace,
            running: None,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|task| task.local_addr())
    }

    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(task) = &self.running {
            return Ok(task.local_addr());
        }

        let listener = self.listener.clone();
        let task = match self.protocol {
            Protocol::Http => http::start(&self.host, self.port, listener).await?,
            Protocol::WebSocket => stream::start(&self.host, self.port, listener).await?,
            Protocol::Udp => datagram::start(&self.host, self.port, listener).await?,
        };

        let local_addr = task.local_addr();
        self.running = Some(task);
        Ok(local_addr)
    }

    /// Releases the bound port before returning.
    pub async fn stop(&mut self) {
        if let Some(task) = self.running.take() {
            task.stop(self.stop_grace).await;
        }
    }
}

/// Checks that a peer answers on `address`.
///
/// UDP has no acknowledgement to wait for, so datagram peers always pass.
pub async fn probe(client: &reqwest::Client, address: &Address, timeout: Duration) -> Result<()> {
    match address.protocol {
        Protocol::Http => http::probe(client, address, timeout).await,
        Protocol::WebSocket => stream::probe(address, timeout).await,
        Protocol::Udp => Ok(()),
    }
}
