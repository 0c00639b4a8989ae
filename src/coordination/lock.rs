//! Advisory, time-bounded locks on top of [`SharedStore::try_lock`].
//!
//! A lock is taken under a fresh random token, so only the acquiring call site can
//! release it. If the holder crashes, the claim expires after its TTL and the next
//! acquirer takes it over. There is no fencing: holders must re-validate any state
//! they depend on inside the critical section.

use crate::store::SharedStore;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Pause between two acquisition attempts while the lock is held elsewhere.
const RETRY_DELAY: Duration = Duration::from_millis(10);

/// A held lock. Must be released explicitly with [`LockGuard::release`].
pub struct LockGuard {
    store: Arc<dyn SharedStore>,
    name: &'static str,
    token: String,
}

impl LockGuard {
    /// Tries to take `name` for up to `wait`.
    ///
    /// Returns `Ok(None)` if the lock stayed held by someone else for the whole wait.
    pub async fn acquire(
        store: &Arc<dyn SharedStore>,
        name: &'static str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Option<Self>> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait;

        loop {
            if store.try_lock(name, &token, ttl).await? {
                tracing::trace!("Acquired {} ({})", name, token);
                return Ok(Some(Self {
                    store: store.clone(),
                    name,
                    token,
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!("Gave up on {} after {:?}", name, wait);
                return Ok(None);
            }

            let jitter = Duration::from_millis(rand::random::<u64>() % 10);
            tokio::time::sleep((RETRY_DELAY + jitter).min(deadline - now)).await;
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Releases the lock. `Ok(false)` means it had already expired and been taken over.
    pub async fn release(self) -> Result<bool> {
        let released = self.store.unlock(self.name, &self.token).await?;
        if !released {
            tracing::warn!("Lock {} expired before release", self.name);
        }
        Ok(released)
    }

    /// Releases the lock, logging instead of propagating a store failure.
    /// An unreleased lock only costs peers one TTL.
    pub async fn release_logged(self) {
        let name = self.name;
        if let Err(e) = self.release().await {
            tracing::warn!("Failed to release {}: {}", name, e);
        }
    }
}
