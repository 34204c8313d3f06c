use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::background::BackgroundTask;
use crate::config::SessionConfig;
use crate::directory::{Address, Message};
use crate::error::{ChatError, ChatResult};
use crate::registry::DirectoryQuery;
use crate::transport::ChatClient;

/// Result of a successful directory refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryUpdate {
    /// The new snapshot, sorted by name.
    pub peers: BTreeMap<String, Address>,
    /// Set when the selected peer is no longer registered.
    pub lost_selection: Option<String>,
    /// Transport handles released because their peer left or moved.
    pub dropped_handles: usize,
}

/// A lazily opened transport to one peer, valid for one address.
struct PeerHandle {
    address: Address,
    client: Arc<ChatClient>,
}

#[derive(Default)]
struct SessionState {
    selected: Option<String>,
    peers: HashMap<String, Address>,
    handles: HashMap<String, PeerHandle>,
}

/// One user's view of the chat: a cached directory, a selected peer and the
/// transports opened so far.
///
/// State is only touched by the owning console and the session's own
/// refresher. Sends run outside the state lock, so a slow peer never delays
/// a refresh.
pub struct ChatSession {
    name: String,
    directory: Arc<dyn DirectoryQuery>,
    http: reqwest::Client,
    config: SessionConfig,
    state: Mutex<SessionState>,
}

impl ChatSession {
    pub fn new(
        name: impl Into<String>,
        directory: Arc<dyn DirectoryQuery>,
        http: reqwest::Client,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            directory,
            http,
            config,
            state: Mutex::new(SessionState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the cached directory with a fresh snapshot.
    ///
    /// On failure nothing changes: a stale directory beats an empty one.
    pub async fn refresh_directory(&self) -> ChatResult<DirectoryUpdate> {
        let fresh = self.directory.list().await.map_err(|e| match e {
            ChatError::DirectoryUnavailable(_) => e,
            other => ChatError::directory(other),
        })?;

        let mut state = self.state.lock().await;

        let lost_selection = match &state.selected {
            Some(selected) if !fresh.contains_key(selected) => state.selected.take(),
            _ => None,
        };

        let before = state.handles.len();
        state
            .handles
            .retain(|name, handle| fresh.get(name) == Some(&handle.address));
        let dropped_handles = before - state.handles.len();

        if dropped_handles > 0 {
            tracing::debug!("Released {} transport handles", dropped_handles);
        }

        state.peers = fresh;

        Ok(DirectoryUpdate {
            peers: state
                .peers
                .iter()
                .map(|(name, address)| (name.clone(), address.clone()))
                .collect(),
            lost_selection,
            dropped_handles,
        })
    }

    pub async fn select_peer(&self, name: &str) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        if !state.peers.contains_key(name) {
            return Err(ChatError::UnknownPeer(name.to_string()));
        }
        state.selected = Some(name.to_string());
        Ok(())
    }

    pub async fn selected_peer(&self) -> Option<String> {
        self.state.lock().await.selected.clone()
    }

    pub async fn peers(&self) -> BTreeMap<String, Address> {
        let state = self.state.lock().await;
        state
            .peers
            .iter()
            .map(|(name, address)| (name.clone(), address.clone()))
            .collect()
    }

    pub async fn open_handles(&self) -> usize {
        self.state.lock().await.handles.len()
    }

    /// Sends `text` to the selected peer, opening its transport on first use.
    pub async fn send_to_selected(&self, text: &str) -> ChatResult<()> {
        let client = {
            let mut state = self.state.lock().await;

            let peer = state.selected.clone().ok_or(ChatError::NoPeerSelected)?;
            let address = state
                .peers
                .get(&peer)
                .cloned()
                .ok_or_else(|| ChatError::UnknownPeer(peer.clone()))?;

            let handle = state.handles.entry(peer).or_insert_with(|| {
                tracing::debug!("Opening {} transport to {}", address.protocol, address);
                PeerHandle {
                    client: Arc::new(ChatClient::connect(&address, &self.http, &self.config.transport)),
                    address,
                }
            });
            handle.client.clone()
        };

        client.send(&Message::new(self.name.as_str(), text)).await
    }

    /// Keeps the directory fresh in the background. Unlike a user-driven
    /// refresh this never prints; problems go to the log.
    pub fn spawn_refresher(self: Arc<Self>) -> BackgroundTask {
        let period = self.config.refresh_period;

        BackgroundTask::spawn_periodic("directory-refresh", period, move || {
            let session = self.clone();
            async move {
                match session.refresh_directory().await {
                    Ok(update) => {
                        tracing::debug!("Directory refreshed: {} users", update.peers.len());
                        if let Some(lost) = update.lost_selection {
                            tracing::warn!("Selected user {} was removed from registry", lost);
                        }
                    }
                    Err(e) => tracing::warn!("Cannot get users from registry: {}", e),
                }
            }
        })
    }
}
