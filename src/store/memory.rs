use super::SharedStore;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
struct LockEntry {
    token: String,
    expires_at: Instant,
}

/// In-process implementation of [`SharedStore`].
///
/// Each primitive touches exactly one `DashMap` entry, which makes it atomic without a
/// global mutex. Blocked pops park on a shared `Notify` that every push wakes.
pub struct MemoryStore {
    /// Scalar keys (`generator`, `start`, `last_index`).
    scalars: DashMap<String, String>,

    /// FIFO lists (`queue`, `errors`). Empty lists are removed.
    lists: DashMap<String, VecDeque<String>>,

    /// Advisory locks (`gen_lock`, `accept_lock`).
    locks: DashMap<String, LockEntry>,

    pushed: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            scalars: DashMap::new(),
            lists: DashMap::new(),
            locks: DashMap::new(),
            pushed: Notify::new(),
        }
    }

    fn pop_now(&self, list: &str) -> Option<String> {
        let value = self
            .lists
            .get_mut(list)
            .and_then(|mut entries| entries.pop_front());
        self.lists.remove_if(list, |_, entries| entries.is_empty());
        value
    }

    /// Accessor for Testing: copies a list without consuming it.
    pub fn peek_list(&self, list: &str) -> Vec<String> {
        self.lists
            .get(list)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Accessor for Testing: the token currently holding `name`, expired or not.
    pub fn lock_holder(&self, name: &str) -> Option<String> {
        self.locks.get(name).map(|held| held.token.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.scalars.get(key).map(|value| value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.scalars.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<usize> {
        let mut removed = 0;
        for key in keys {
            removed += usize::from(self.scalars.remove(*key).is_some());
            removed += usize::from(self.lists.remove(*key).is_some());
            removed += usize::from(self.locks.remove(*key).is_some());
        }
        tracing::debug!("Deleted {} of {} keys", removed, keys.len());
        Ok(removed)
    }

    async fn push(&self, list: &str, value: &str) -> Result<usize> {
        let len = {
            let mut entries = self.lists.entry(list.to_string()).or_default();
            entries.push_back(value.to_string());
            entries.len()
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn pop(&self, list: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before checking, otherwise a push landing between the
            // check and the await would be missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.pop_now(list) {
                return Ok(Some(value));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.pop_now(list));
            }
        }
    }

    async fn len(&self, list: &str) -> Result<usize> {
        Ok(self.lists.get(list).map(|entries| entries.len()).unwrap_or(0))
    }

    async fn drain(&self, list: &str) -> Result<Vec<String>> {
        Ok(self
            .lists
            .remove(list)
            .map(|(_, entries)| entries.into_iter().collect())
            .unwrap_or_default())
    }

    async fn try_lock(&self, name: &str, token: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let claim = LockEntry {
            token: token.to_string(),
            expires_at: now + ttl,
        };

        match self.locks.entry(name.to_string()) {
            Entry::Occupied(mut held) => {
                let current = held.get();
                if current.token == token || current.expires_at <= now {
                    if current.token != token {
                        tracing::debug!("Lock {} expired, taking it over", name);
                    }
                    held.insert(claim);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(claim);
                Ok(true)
            }
        }
    }

    async fn unlock(&self, name: &str, token: &str) -> Result<bool> {
        Ok(self
            .locks
            .remove_if(name, |_, held| held.token == token)
            .is_some())
    }
}
