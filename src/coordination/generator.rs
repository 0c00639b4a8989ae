//! Generator Role
//!
//! Emits messages `1..=N` into the shared queue at the configured cadence while this
//! process holds the generator role.
//!
//! Every emission is one `gen_lock` critical section that re-validates ownership and
//! re-reads the resume point, so a generator elected after a failover continues
//! strictly after the last index its predecessor persisted.

use super::cadence::{delay_until, expected_timestamp, now_secs};
use super::lock::LockGuard;
use super::types::{Message, ProcessName, keys, read_last_index, read_start};
use crate::config::ClusterConfig;
use crate::store::SharedStore;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Pause after a failed step before trying again.
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Terminal state of a generator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorOutcome {
    /// The completion sentinel is in place, by this run or a predecessor.
    Complete { emitted: u64 },
    /// Another process claimed the role; nothing further was written.
    Superseded { emitted: u64 },
    /// Shutdown was requested between two critical sections.
    Stopped { emitted: u64 },
}

impl GeneratorOutcome {
    pub fn emitted(&self) -> u64 {
        match self {
            Self::Complete { emitted }
            | Self::Superseded { emitted }
            | Self::Stopped { emitted } => *emitted,
        }
    }
}

/// Result of one critical section.
#[derive(Debug)]
enum Step {
    Emitted {
        message: Message,
        start: f64,
        finished: bool,
    },
    Superseded {
        holder: Option<String>,
    },
    AlreadyComplete,
    LockUnavailable,
}

pub struct Generator {
    store: Arc<dyn SharedStore>,
    name: ProcessName,
    config: ClusterConfig,
    shutdown: watch::Receiver<bool>,
}

impl Generator {
    pub fn new(
        store: Arc<dyn SharedStore>,
        name: ProcessName,
        config: ClusterConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            name,
            config,
            shutdown,
        }
    }

    /// Runs until the sequence is complete, the role is lost, or shutdown is requested.
    ///
    /// Store failures and lock contention are retried; they never end the run.
    pub async fn run(mut self) -> GeneratorOutcome {
        tracing::info!("Generator {} started", self.name);
        let mut emitted = 0;

        loop {
            if *self.shutdown.borrow() {
                tracing::info!("Generator {} stopping on shutdown", self.name);
                return GeneratorOutcome::Stopped { emitted };
            }

            let step = match self.step().await {
                Ok(step) => step,
                Err(e) => {
                    tracing::warn!("Generator {} step failed: {}", self.name, e);
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            match step {
                Step::Emitted {
                    message,
                    start,
                    finished,
                } => {
                    emitted += 1;
                    tracing::info!("Generator {} emitted {}", self.name, message);

                    if finished {
                        tracing::info!(
                            "Generator {} completed the sequence ({} emitted by this run)",
                            self.name,
                            emitted
                        );
                        return GeneratorOutcome::Complete { emitted };
                    }

                    let next = expected_timestamp(start, self.config.interval, message.index + 1);
                    let delay = delay_until(next, now_secs());
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        Ok(()) = self.shutdown.changed() => {}
                    }
                }
                Step::Superseded { holder } => {
                    tracing::info!(
                        "Generator {} superseded by {}",
                        self.name,
                        holder.as_deref().unwrap_or("<nobody>")
                    );
                    return GeneratorOutcome::Superseded { emitted };
                }
                Step::AlreadyComplete => {
                    tracing::info!("Generator {} found the sequence already complete", self.name);
                    return GeneratorOutcome::Complete { emitted };
                }
                Step::LockUnavailable => {
                    tracing::debug!("Generator {} could not take {}", self.name, keys::GEN_LOCK);
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    async fn step(&self) -> Result<Step> {
        let Some(guard) = LockGuard::acquire(
            &self.store,
            keys::GEN_LOCK,
            self.config.lock_ttl,
            self.config.lock_wait,
        )
        .await?
        else {
            return Ok(Step::LockUnavailable);
        };

        let step = self.emit_next().await;
        guard.release_logged().await;
        step
    }

    /// Body of the critical section. Caller holds `gen_lock`.
    async fn emit_next(&self) -> Result<Step> {
        let store = self.store.as_ref();

        let holder = store.get(keys::GENERATOR).await?;
        if holder.as_deref() != Some(self.name.as_str()) {
            return Ok(Step::Superseded { holder });
        }

        let count = self.config.message_count;
        let sentinel = self.config.completion_sentinel();
        let last = read_last_index(store).await?.unwrap_or(0);
        if last >= count {
            if last < sentinel {
                store.set(keys::LAST_INDEX, &sentinel.to_string()).await?;
            }
            return Ok(Step::AlreadyComplete);
        }

        // The first emission of the run anchors the cadence for every later generator.
        let start = match read_start(store).await? {
            Some(start) => start,
            None => {
                let now = now_secs();
                store.set(keys::START, &format!("{:.6}", now)).await?;
                tracing::info!("Generator {} anchored the run at {:.6}", self.name, now);
                now
            }
        };

        let index = last + 1;
        store.set(keys::LAST_INDEX, &index.to_string()).await?;
        let message = Message::generate(index);
        if let Err(e) = store.push(keys::QUEUE, &message.to_string()).await {
            // Still under gen_lock: rewind so the next pass emits the same index again.
            if let Err(rewind) = store.set(keys::LAST_INDEX, &last.to_string()).await {
                tracing::error!(
                    "Generator {} failed to rewind last_index to {}: {}",
                    self.name,
                    last,
                    rewind
                );
            }
            return Err(e.context(format!("Failed to enqueue index {}", index)));
        }

        let finished = index == count;
        if finished {
            store.set(keys::LAST_INDEX, &sentinel.to_string()).await?;
        }

        Ok(Step::Emitted {
            message,
            start,
            finished,
        })
    }
}
