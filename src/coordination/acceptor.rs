//! Acceptor Role
//!
//! Runs in every process, generator or not. Each pass:
//! 1. Under `accept_lock`, evaluates the progress marker: bootstraps the first election,
//!    detects completion, or judges the generator stale.
//! 2. Outside any lock, triggers the election the evaluation asked for.
//! 3. Pops one message (bounded wait) and processes it.
//!
//! The acceptor never fails: store errors and lock contention only cost one pass.

use super::cadence::{expected_timestamp, is_stale, now_secs};
use super::election::{ElectionCoordinator, ElectionOutcome};
use super::lock::LockGuard;
use super::types::{Disposition, Message, ProcessName, Progress, keys};
use crate::config::ClusterConfig;
use crate::store::SharedStore;

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// What the acceptor did over its whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptorReport {
    /// Indices of every consumed message, in consumption order.
    pub consumed: Vec<u64>,
    /// Messages routed to the `errors` list.
    pub faulty: usize,
    /// Elections this acceptor triggered (bootstrap and failover).
    pub elections: usize,
}

/// Verdict of one locked evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Continue,
    /// No start recorded yet: nobody has emitted.
    Bootstrap,
    /// The progress marker lags its expected timestamp by more than `max_interval`.
    Stale,
    /// Sentinel written and queue drained.
    Finished,
}

pub struct Acceptor {
    store: Arc<dyn SharedStore>,
    name: ProcessName,
    config: ClusterConfig,
    election: Arc<ElectionCoordinator>,
    shutdown: watch::Receiver<bool>,
}

impl Acceptor {
    pub fn new(
        store: Arc<dyn SharedStore>,
        config: ClusterConfig,
        election: Arc<ElectionCoordinator>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            name: election.name().clone(),
            config,
            election,
            shutdown,
        }
    }

    /// Loops until the sequence is complete and drained, or shutdown is requested.
    pub async fn run(self) -> AcceptorReport {
        tracing::info!("Acceptor {} started", self.name);
        let mut report = AcceptorReport::default();

        loop {
            if *self.shutdown.borrow() {
                tracing::info!("Acceptor {} stopping on shutdown", self.name);
                break;
            }

            match self.evaluate().await {
                Ok(Verdict::Finished) => {
                    tracing::info!("Acceptor {}: sequence complete and queue drained", self.name);
                    break;
                }
                Ok(Verdict::Bootstrap) | Ok(Verdict::Stale) => {
                    self.trigger_election(&mut report).await;
                }
                Ok(Verdict::Continue) => {}
                Err(e) => {
                    tracing::warn!("Acceptor {} evaluation failed: {}", self.name, e);
                }
            }

            match self.store.pop(keys::QUEUE, self.config.poll_timeout).await {
                Ok(Some(raw)) => self.accept(&raw, &mut report).await,
                Ok(None) => tracing::trace!("Acceptor {}: queue empty", self.name),
                Err(e) => {
                    tracing::warn!("Acceptor {} failed to pop: {}", self.name, e);
                    tokio::time::sleep(self.config.poll_timeout).await;
                }
            }
        }

        tracing::info!(
            "Acceptor {} finished: {} consumed, {} faulty, {} elections triggered",
            self.name,
            report.consumed.len(),
            report.faulty,
            report.elections
        );
        report
    }

    async fn evaluate(&self) -> Result<Verdict> {
        let Some(guard) = LockGuard::acquire(
            &self.store,
            keys::ACCEPT_LOCK,
            self.config.lock_ttl,
            self.config.lock_wait,
        )
        .await?
        else {
            tracing::debug!("Acceptor {} skipped evaluation, {} busy", self.name, keys::ACCEPT_LOCK);
            return Ok(Verdict::Continue);
        };

        let verdict = self.evaluate_locked().await;
        guard.release_logged().await;
        verdict
    }

    /// Body of the `accept_lock` critical section.
    async fn evaluate_locked(&self) -> Result<Verdict> {
        let progress = Progress::load(self.store.as_ref()).await?;

        let Some(start) = progress.start else {
            return Ok(Verdict::Bootstrap);
        };

        if progress.is_complete(self.config.message_count) {
            // Keep draining whatever is still queued before stopping.
            let remaining = self.store.len(keys::QUEUE).await?;
            return Ok(if remaining == 0 {
                Verdict::Finished
            } else {
                Verdict::Continue
            });
        }

        let last_index = progress.last_index.unwrap_or(0);
        let now = now_secs();
        if is_stale(
            start,
            self.config.interval,
            last_index,
            self.config.max_interval,
            now,
        ) {
            let expected = expected_timestamp(start, self.config.interval, last_index);
            tracing::warn!(
                "Acceptor {}: generator stale, index {} expected at {:.3}, now {:.3} ({:.3}s late)",
                self.name,
                last_index,
                expected,
                now,
                now - expected
            );
            return Ok(Verdict::Stale);
        }

        Ok(Verdict::Continue)
    }

    async fn trigger_election(&self, report: &mut AcceptorReport) {
        report.elections += 1;

        match self.election.ensure_generator().await {
            Ok(ElectionOutcome::Elected { .. }) => {
                tracing::info!("Acceptor {} took over the generator role", self.name);
            }
            Ok(outcome) => {
                tracing::debug!("Acceptor {} election: {:?}", self.name, outcome);
            }
            Err(e) => {
                tracing::warn!("Acceptor {} election failed: {}", self.name, e);
            }
        }
    }

    async fn accept(&self, raw: &str, report: &mut AcceptorReport) {
        let started = Instant::now();

        let message = match raw.parse::<Message>() {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Acceptor {} got an unparseable entry: {}", self.name, e);
                self.record_error(raw, report).await;
                return;
            }
        };

        let disposition = message.disposition();
        match disposition {
            Disposition::Faulty => self.record_error(raw, report).await,
            Disposition::Malformed => {
                tracing::warn!("Acceptor {} got a malformed body: {}", self.name, raw);
                self.record_error(raw, report).await;
            }
            Disposition::Regular => {
                tokio::time::sleep(self.config.interval).await;
            }
        }

        report.consumed.push(message.index);
        tracing::info!(
            "Acceptor {} accepted {} ({:?}) in {:?}",
            self.name,
            message,
            disposition,
            started.elapsed()
        );
    }

    async fn record_error(&self, raw: &str, report: &mut AcceptorReport) {
        report.faulty += 1;
        if let Err(e) = self.store.push(keys::ERRORS, raw).await {
            tracing::error!("Acceptor {} failed to record error {}: {}", self.name, raw, e);
        }
    }
}
