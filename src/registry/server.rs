use anyhow::Result;
use axum::extract::Extension;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::handlers::*;
use super::protocol::*;
use super::store::RegistryStore;
use crate::background::{ServerTask, stopped};

pub fn router(store: Arc<RegistryStore>) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(handle_health))
        .route(
            ENDPOINT_USERS,
            get(handle_list)
                .post(handle_register)
                .put(handle_upsert_by_query)
                .delete(handle_unregister_by_query),
        )
        .route(ENDPOINT_USER, axum::routing::put(handle_upsert).delete(handle_unregister))
        .layer(Extension(store))
}

/// Serves the registry query surface until the returned task is stopped.
pub async fn start(host: &str, port: u16, store: Arc<RegistryStore>) -> Result<ServerTask> {
    let listener = TcpListener::bind((host, port)).await?;
    let local_addr = listener.local_addr()?;
    let app = router(store);

    Ok(ServerTask::spawn("registry", local_addr, move |mut signal| async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            stopped(&mut signal).await;
        });

        if let Err(e) = server.await {
            tracing::error!("Registry server error: {}", e);
        }
    }))
}
