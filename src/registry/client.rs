//! Client side of the registry query surface.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use super::protocol::*;
use super::store::RegistryStore;
use crate::directory::{Address, UserRecord};
use crate::error::{ChatError, ChatResult};

/// Read access to the directory, as needed by a chat session.
#[async_trait]
pub trait DirectoryQuery: Send + Sync {
    async fn list(&self) -> ChatResult<HashMap<String, Address>>;
}

#[async_trait]
impl DirectoryQuery for RegistryStore {
    async fn list(&self) -> ChatResult<HashMap<String, Address>> {
        Ok(RegistryStore::list(self))
    }
}

pub struct RegistryClient {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl RegistryClient {
    pub fn new(base_url: &str, client: reqwest::Client, timeout: Duration) -> ChatResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ChatError::directory(format!("bad registry URL {:?}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::directory(format!("bad registry URL {:?}", base_url.as_str())));
        }

        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }

    /// `/v1/users/{name}`, or `/v1/users?name=` for `.` and `..`, which URL
    /// normalization strips from a path even when percent-encoded.
    fn user_endpoint(&self, name: &str) -> Url {
        let mut url = self.endpoint(ENDPOINT_USERS);
        if is_dot_segment(name) {
            url.query_pairs_mut().append_pair("name", name);
        } else if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(name);
        }
        url
    }

    pub async fn register(&self, record: &UserRecord) -> ChatResult<()> {
        let response = self
            .client
            .post(self.endpoint(ENDPOINT_USERS))
            .json(record)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ChatError::directory)?;

        check_status(response, &record.name).await.map(|_| ())
    }

    pub async fn upsert(&self, name: &str, address: &Address) -> ChatResult<()> {
        let response = self
            .client
            .put(self.user_endpoint(name))
            .json(address)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ChatError::directory)?;

        check_status(response, name).await.map(|_| ())
    }

    pub async fn unregister(&self, name: &str) -> ChatResult<()> {
        let response = self
            .client
            .delete(self.user_endpoint(name))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ChatError::directory)?;

        check_status(response, name).await.map(|_| ())
    }

    pub async fn health(&self) -> ChatResult<()> {
        let response = self
            .client
            .get(self.endpoint(ENDPOINT_HEALTH))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ChatError::directory)?;

        let body = check_status(response, "")
            .await?
            .text()
            .await
            .map_err(ChatError::directory)?;

        if body != ALIVE_TOKEN {
            return Err(ChatError::directory(format!("unexpected health token {:?}", body)));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryQuery for RegistryClient {
    async fn list(&self) -> ChatResult<HashMap<String, Address>> {
        let response = self
            .client
            .get(self.endpoint(ENDPOINT_USERS))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ChatError::directory)?;

        check_status(response, "")
            .await?
            .json::<HashMap<String, Address>>()
            .await
            .map_err(ChatError::directory)
    }
}

fn is_dot_segment(name: &str) -> bool {
    matches!(name, "." | "..")
}

async fn check_status(response: reqwest::Response, name: &str) -> ChatResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::CONFLICT => ChatError::DuplicateName(name.to_string()),
        StatusCode::BAD_REQUEST if body == ILLEGAL_ADDRESS => ChatError::InvalidAddress(body),
        StatusCode::BAD_REQUEST if body == ILLEGAL_USER_NAME => ChatError::InvalidName(name.to_string()),
        _ => ChatError::directory(format!("registry answered {}: {}", status, body)),
    })
}
