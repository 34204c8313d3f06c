//! Persistent-stream binding over WebSocket.
//!
//! The client keeps one connection per destination. `send` only enqueues; a
//! dedicated drain worker owns the socket, opens it when the first message
//! arrives and writes frames strictly in enqueue order.

use anyhow::Result;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::{Extension, Router};
use futures::{FutureExt, SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::MessageListener;
use super::codec;
use super::http::handle_health;
use super::protocol::*;
use crate::background::{ServerTask, ShutdownSignal, stopped};
use crate::config::TransportConfig;
use crate::directory::{Address, Message};
use crate::error::{ChatError, ChatResult};

type Connection = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct StreamChatClient {
    url: String,
    queue: mpsc::UnboundedSender<Message>,
    failures: Arc<AtomicU64>,
}

impl StreamChatClient {
    /// Spawns the drain worker; no connection is opened until the first send.
    pub fn new(address: &Address, config: &TransportConfig) -> Self {
        let url = format!("ws://{}{}", address.authority(), ENDPOINT_WS_MESSAGE);
        let (queue, pending) = mpsc::unbounded_channel();
        let failures = Arc::new(AtomicU64::new(0));

        let worker = DrainWorker {
            url: url.clone(),
            pending,
            connection: None,
            io_timeout: config.connect_timeout,
            failures: failures.clone(),
        };
        tokio::spawn(worker.run());

        Self {
            url,
            queue,
            failures,
        }
    }

    /// Returns once the message is queued. Write failures surface later
    /// through the log and [`failed_sends`](Self::failed_sends).
    pub fn send(&self, message: &Message) -> ChatResult<()> {
        self.queue.send(message.clone()).map_err(|_| {
            ChatError::TransportFailure(format!("stream to {} is closed", self.url))
        })
    }

    /// Messages the worker could not write so far.
    pub fn failed_sends(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

struct DrainWorker {
    url: String,
    pending: mpsc::UnboundedReceiver<Message>,
    connection: Option<Connection>,
    io_timeout: Duration,
    failures: Arc<AtomicU64>,
}

impl DrainWorker {
    /// Runs until every sender is dropped and the queue is empty.
    async fn run(mut self) {
        tracing::debug!("Stream worker for {} started", self.url);

        while let Some(message) = self.pending.recv().await {
            if let Err(e) = self.write(&message).await {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Cannot send message to {}: {}", self.url, e);
                // Reopened lazily by the next message.
                self.connection = None;
            }
        }

        if let Some(mut connection) = self.connection.take() {
            let _ = connection.close(None).await;
        }

        tracing::debug!("Stream worker for {} finished", self.url);
    }

    async fn write(&mut self, message: &Message) -> Result<()> {
        let text = codec::encode_text(message)?;

        if self.connection.as_mut().is_some_and(closed_by_peer) {
            tracing::debug!("Stream to {} was closed by the peer, reopening", self.url);
            self.connection = None;
        }

        if self.connection.is_none() {
            let (connection, _) =
                tokio::time::timeout(self.io_timeout, tokio_tungstenite::connect_async(self.url.as_str()))
                    .await
                    .map_err(|_| anyhow::anyhow!("connect timed out after {:?}", self.io_timeout))??;
            tracing::debug!("Opened stream to {}", self.url);
            self.connection = Some(connection);
        }

        let Some(connection) = self.connection.as_mut() else {
            anyhow::bail!("no connection");
        };

        tokio::time::timeout(self.io_timeout, connection.send(Frame::Text(text.into())))
            .await
            .map_err(|_| anyhow::anyhow!("write timed out after {:?}", self.io_timeout))??;

        Ok(())
    }
}

/// Drains frames the peer already sent, without waiting. `true` once the peer
/// closed its side; the worker reads nowhere else.
fn closed_by_peer(connection: &mut Connection) -> bool {
    loop {
        match connection.next().now_or_never() {
            None => return false,
            Some(None) | Some(Some(Err(_))) | Some(Some(Ok(Frame::Close(_)))) => return true,
            Some(Some(Ok(_))) => {}
        }
    }
}

/// Liveness: a WebSocket handshake on the bare endpoint must succeed.
pub async fn probe(address: &Address, timeout: Duration) -> Result<()> {
    let url = format!("ws://{}{}", address.authority(), ENDPOINT_WS_PROBE);

    let (mut connection, _) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str()))
        .await
        .map_err(|_| anyhow::anyhow!("handshake timed out"))??;
    let _ = connection.close(None).await;

    Ok(())
}

pub fn router(listener: MessageListener, signal: ShutdownSignal) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(handle_health))
        .route(ENDPOINT_WS_MESSAGE, get(handle_message_socket))
        .route(ENDPOINT_WS_PROBE, get(handle_probe_socket))
        .layer(Extension(listener))
        .layer(Extension(signal))
}

async fn handle_message_socket(
    ws: WebSocketUpgrade,
    Extension(listener): Extension<MessageListener>,
    Extension(signal): Extension<ShutdownSignal>,
) -> Response {
    ws.on_upgrade(move |socket| receive_frames(socket, listener, signal))
}

async fn handle_probe_socket(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|mut socket| async move {
        let _ = socket.send(WsMessage::Close(None)).await;
    })
}

/// Decodes every text frame of one connection; other frame kinds are ignored.
async fn receive_frames(mut socket: WebSocket, listener: MessageListener, mut signal: ShutdownSignal) {
    loop {
        let frame = tokio::select! {
            frame = socket.recv() => frame,
            _ = stopped(&mut signal) => {
                let _ = socket.send(WsMessage::Close(None)).await;
                break;
            }
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => match codec::decode_text(&text) {
                Ok(message) => listener(&message.user, &message.text),
                Err(e) => tracing::warn!("Skipping malformed frame: {}", e),
            },
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!("Stream connection error: {}", e);
                break;
            }
        }
    }
}

pub async fn start(host: &str, port: u16, listener: MessageListener) -> Result<ServerTask> {
    let tcp = TcpListener::bind((host, port)).await?;
    let local_addr = tcp.local_addr()?;

    Ok(ServerTask::spawn("websocket-chat", local_addr, move |mut signal| {
        let app = router(listener, signal.clone());
        async move {
            let server = axum::serve(tcp, app).with_graceful_shutdown(async move {
                stopped(&mut signal).await;
            });

            if let Err(e) = server.await {
                tracing::error!("WebSocket chat server error: {}", e);
            }
        }
    }))
}
