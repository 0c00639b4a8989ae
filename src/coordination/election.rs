//! Election Coordinator
//!
//! "Last writer wins under lock": whoever holds `gen_lock` when it decides to claim the
//! role writes its name into `generator`. There is no fencing token, so correctness
//! rests on the lock's mutual exclusion plus the ownership re-check the generator
//! performs before every emission.

use super::generator::{Generator, GeneratorOutcome};
use super::lock::LockGuard;
use super::types::{ProcessName, keys};
use crate::config::ClusterConfig;
use crate::store::SharedStore;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

/// What a single election attempt decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// This process wrote its name; `previous` is the holder it replaced, if any.
    Elected { previous: Option<String> },
    /// This process already held the role.
    Incumbent,
    /// `gen_lock` stayed busy for the whole bounded wait. Retried on a later pass.
    LockUnavailable,
}

pub struct ElectionCoordinator {
    store: Arc<dyn SharedStore>,
    name: ProcessName,
    config: ClusterConfig,
    shutdown: watch::Receiver<bool>,
    /// The local generator task, if one was ever started.
    generator: Mutex<Option<JoinHandle<GeneratorOutcome>>>,
}

impl ElectionCoordinator {
    pub fn new(
        store: Arc<dyn SharedStore>,
        name: ProcessName,
        config: ClusterConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            name,
            config,
            shutdown,
            generator: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &ProcessName {
        &self.name
    }

    /// Makes sure this process is the generator, starting a local generator task when
    /// it wins the role.
    ///
    /// A task is also (re)started when this process is the incumbent but its local task
    /// has ended, e.g. after a panic. Never more than one local task runs at a time.
    pub async fn ensure_generator(&self) -> Result<ElectionOutcome> {
        let outcome = self.claim().await?;

        match &outcome {
            ElectionOutcome::Elected { previous } => {
                tracing::info!(
                    "{} elected as generator (previous: {})",
                    self.name,
                    previous.as_deref().unwrap_or("<none>")
                );
                self.start_generator().await;
            }
            ElectionOutcome::Incumbent => {
                if !self.generator_running().await {
                    tracing::warn!(
                        "{} holds the generator role without a running generator, restarting it",
                        self.name
                    );
                    self.start_generator().await;
                }
            }
            ElectionOutcome::LockUnavailable => {
                tracing::warn!(
                    "{} could not take {} for election, will retry",
                    self.name,
                    keys::GEN_LOCK
                );
            }
        }

        Ok(outcome)
    }

    /// The decision half of the election, without touching the local generator task.
    pub async fn claim(&self) -> Result<ElectionOutcome> {
        let Some(guard) = LockGuard::acquire(
            &self.store,
            keys::GEN_LOCK,
            self.config.lock_ttl,
            self.config.lock_wait,
        )
        .await?
        else {
            return Ok(ElectionOutcome::LockUnavailable);
        };

        let outcome = self.claim_locked().await;
        guard.release_logged().await;
        outcome
    }

    async fn claim_locked(&self) -> Result<ElectionOutcome> {
        let current = self.store.get(keys::GENERATOR).await?;

        if current.as_deref() == Some(self.name.as_str()) {
            return Ok(ElectionOutcome::Incumbent);
        }

        self.store.set(keys::GENERATOR, self.name.as_str()).await?;
        Ok(ElectionOutcome::Elected { previous: current })
    }

    pub async fn generator_running(&self) -> bool {
        self.generator
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn start_generator(&self) {
        let mut slot = self.generator.lock().await;

        // A task that was superseded but has not noticed yet picks the role back up on
        // its next ownership check; a second task would only double the cadence.
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("{} reuses its still-running generator", self.name);
            return;
        }

        let generator = Generator::new(
            self.store.clone(),
            self.name.clone(),
            self.config.clone(),
            self.shutdown.clone(),
        );
        *slot = Some(tokio::spawn(generator.run()));
    }

    /// Waits for the local generator task, if any, and returns how it ended.
    pub async fn join_generator(&self) -> Option<GeneratorOutcome> {
        let handle = self.generator.lock().await.take()?;

        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!("Generator task of {} failed: {}", self.name, e);
                None
            }
        }
    }
}
