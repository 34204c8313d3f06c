//! Request/response binding: one HTTP POST per message.

use anyhow::Result;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use std::time::Duration;
use tokio::net::TcpListener;

use super::MessageListener;
use super::codec;
use super::protocol::*;
use crate::background::{ServerTask, stopped};
use crate::config::TransportConfig;
use crate::directory::{Address, Message};
use crate::error::{ChatError, ChatResult};

pub struct HttpChatClient {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpChatClient {
    pub fn new(address: &Address, client: reqwest::Client, config: &TransportConfig) -> Self {
        Self {
            url: format!("http://{}{}", address.authority(), ENDPOINT_MESSAGE),
            client,
            timeout: config.request_timeout,
        }
    }

    pub async fn send(&self, message: &Message) -> ChatResult<()> {
        let body = codec::encode_text(message).map_err(ChatError::transport)?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("POST {} failed: {}", self.url, e);
                ChatError::transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("POST {} answered {}", self.url, status);
            return Err(ChatError::TransportFailure(format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }

        Ok(())
    }
}

/// Liveness: `GET /v1/health` must answer exactly [`ALIVE_TOKEN`].
pub async fn probe(client: &reqwest::Client, address: &Address, timeout: Duration) -> Result<()> {
    let url = format!("http://{}{}", address.authority(), ENDPOINT_HEALTH);
    let response = client.get(&url).timeout(timeout).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("health check answered {}", response.status());
    }

    let body = response.text().await?;
    if body != ALIVE_TOKEN {
        anyhow::bail!("unexpected health token {:?}", body);
    }

    Ok(())
}

pub fn router(listener: MessageListener) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(handle_health))
        .route(ENDPOINT_MESSAGE, post(handle_message))
        .layer(Extension(listener))
}

pub async fn handle_health() -> &'static str {
    ALIVE_TOKEN
}

async fn handle_message(
    Extension(listener): Extension<MessageListener>,
    body: String,
) -> (StatusCode, Json<StatusResponse>) {
    match codec::decode_text(&body) {
        Ok(message) => {
            listener(&message.user, &message.text);
            (StatusCode::OK, Json(StatusResponse::ok()))
        }
        Err(e) => {
            tracing::warn!("Rejected malformed message: {}", e);
            (StatusCode::BAD_REQUEST, Json(StatusResponse::error()))
        }
    }
}

pub async fn start(host: &str, port: u16, listener: MessageListener) -> Result<ServerTask> {
    let tcp = TcpListener::bind((host, port)).await?;
    let local_addr = tcp.local_addr()?;
    let app = router(listener);

    Ok(ServerTask::spawn("http-chat", local_addr, move |mut signal| async move {
        let server = axum::serve(tcp, app).with_graceful_shutdown(async move {
            stopped(&mut signal).await;
        });

        if let Err(e) = server.await {
            tracing::error!("HTTP chat server error: {}", e);
        }
    }))
}
