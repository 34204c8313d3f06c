use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::protocol::*;
use super::store::RegistryStore;
use crate::directory::{Address, UserRecord};
use crate::error::ChatError;

type Rejection = (StatusCode, String);

/// `?name=` form of the per-user routes, for names a URL path cannot carry.
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub name: String,
}

fn reject(err: ChatError) -> Rejection {
    tracing::info!("Rejected registry request: {}", err);

    match err {
        ChatError::InvalidName(_) => (StatusCode::BAD_REQUEST, ILLEGAL_USER_NAME.to_string()),
        ChatError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, ILLEGAL_ADDRESS.to_string()),
        ChatError::DuplicateName(_) => (StatusCode::CONFLICT, USER_ALREADY_REGISTERED.to_string()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

pub async fn handle_health() -> &'static str {
    ALIVE_TOKEN
}

pub async fn handle_register(
    Extension(store): Extension<Arc<RegistryStore>>,
    Json(user): Json<UserRecord>,
) -> Result<Json<StatusResponse>, Rejection> {
    store.register(&user.name, user.address).map_err(reject)?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn handle_list(
    Extension(store): Extension<Arc<RegistryStore>>,
) -> Json<HashMap<String, Address>> {
    Json(store.list())
}

pub async fn handle_upsert(
    Extension(store): Extension<Arc<RegistryStore>>,
    Path(name): Path<String>,
    Json(address): Json<Address>,
) -> Result<Json<StatusResponse>, Rejection> {
    store.upsert(&name, address).map_err(reject)?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn handle_unregister(
    Extension(store): Extension<Arc<RegistryStore>>,
    Path(name): Path<String>,
) -> Json<StatusResponse> {
    store.remove(&name);
    Json(StatusResponse::ok())
}

pub async fn handle_upsert_by_query(
    store: Extension<Arc<RegistryStore>>,
    Query(query): Query<UserQuery>,
    address: Json<Address>,
) -> Result<Json<StatusResponse>, Rejection> {
    handle_upsert(store, Path(query.name), address).await
}

pub async fn handle_unregister_by_query(
    store: Extension<Arc<RegistryStore>>,
    Query(query): Query<UserQuery>,
) -> Json<StatusResponse> {
    handle_unregister(store, Path(query.name)).await
}
