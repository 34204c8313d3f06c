use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;

use crate::directory::{Address, check_user_name};
use crate::error::{ChatError, ChatResult};

/// A registered peer as the store sees it.
///
/// Never handed out: callers get addresses from [`RegistryStore::list`] and
/// request counter changes through the store.
#[derive(Debug, Clone)]
struct DirectoryEntry {
    address: Address,
    consecutive_failures: u32,
}

impl DirectoryEntry {
    fn new(address: Address) -> Self {
        Self {
            address,
            consecutive_failures: 0,
        }
    }
}

/// What a failed probe did to an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Counter incremented, entry kept.
    Counted(u32),
    /// Counter went past the threshold, entry removed.
    Evicted,
    /// Entry is gone or was re-registered elsewhere since the probe.
    Stale,
}

/// Concurrent name → address table.
///
/// Every mutation goes through the `DashMap` entry API, so it is atomic for
/// its name: a reader never sees a half-built entry and a removal racing a
/// counter update always wins.
#[derive(Default)]
pub struct RegistryStore {
    entries: DashMap<String, DirectoryEntry>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, address: Address) -> ChatResult<()> {
        if !check_user_name(name) {
            return Err(ChatError::InvalidName(name.to_string()));
        }
        address.validate()?;

        match self.entries.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ChatError::DuplicateName(name.to_string())),
            Entry::Vacant(slot) => {
                tracing::info!("Registered {} at {}", name, address);
                slot.insert(DirectoryEntry::new(address));
                Ok(())
            }
        }
    }

    /// Creates or replaces; the failure counter restarts from zero.
    ///
    /// The name is only checked when the entry is created.
    pub fn upsert(&self, name: &str, address: Address) -> ChatResult<()> {
        address.validate()?;

        match self.entries.entry(name.to_string()) {
            Entry::Occupied(mut slot) => {
                tracing::info!("Updated {}: {} -> {}", name, slot.get().address, address);
                *slot.get_mut() = DirectoryEntry::new(address);
                Ok(())
            }
            Entry::Vacant(slot) => {
                if !check_user_name(name) {
                    return Err(ChatError::InvalidName(name.to_string()));
                }
                tracing::info!("Registered {} at {}", name, address);
                slot.insert(DirectoryEntry::new(address));
                Ok(())
            }
        }
    }

    /// Returns whether an entry was removed. Absent names are not an error.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.entries.remove(name).is_some();
        if removed {
            tracing::info!("Unregistered {}", name);
        }
        removed
    }

    pub fn list(&self) -> HashMap<String, Address> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().address.clone()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Address> {
        self.entries.get(name).map(|entry| entry.address.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failure_count(&self, name: &str) -> Option<u32> {
        self.entries.get(name).map(|entry| entry.consecutive_failures)
    }

    /// Resets the counter if `name` is still registered at `probed`.
    pub fn record_success(&self, name: &str, probed: &Address) {
        if let Some(mut entry) = self.entries.get_mut(name) {
            if &entry.address == probed {
                entry.consecutive_failures = 0;
            }
        }
    }

    /// Counts a failed probe of `probed` and evicts once the count exceeds
    /// `threshold`.
    pub fn record_failure(&self, name: &str, probed: &Address, threshold: u32) -> FailureOutcome {
        match self.entries.entry(name.to_string()) {
            Entry::Occupied(mut slot) => {
                if &slot.get().address != probed {
                    return FailureOutcome::Stale;
                }

                let entry = slot.get_mut();
                entry.consecutive_failures += 1;
                let failures = entry.consecutive_failures;

                if failures > threshold {
                    slot.remove();
                    FailureOutcome::Evicted
                } else {
                    FailureOutcome::Counted(failures)
                }
            }
            Entry::Vacant(_) => FailureOutcome::Stale,
        }
    }
}
