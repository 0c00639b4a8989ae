use super::acceptor::{Acceptor, AcceptorReport};
use super::election::ElectionCoordinator;
use super::types::ProcessName;
use crate::config::ClusterConfig;
use crate::store::SharedStore;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;

/// One worker process: an acceptor, plus a generator whenever this process wins the role.
pub struct Worker {
    store: Arc<dyn SharedStore>,
    name: ProcessName,
    config: ClusterConfig,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
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

    /// Runs until the sequence is complete and drained, or shutdown is requested.
    ///
    /// Fails only on an invalid configuration, before touching the store.
    pub async fn run(self) -> Result<AcceptorReport> {
        self.config.validate()?;

        tracing::info!(
            "Worker {} joining: {} messages every {:?}, stale after {:?}",
            self.name,
            self.config.message_count,
            self.config.interval,
            self.config.max_interval
        );

        let election = ElectionCoordinator::new(
            self.store.clone(),
            self.name.clone(),
            self.config.clone(),
            self.shutdown.clone(),
        );
        let acceptor = Acceptor::new(
            self.store.clone(),
            self.config.clone(),
            election.clone(),
            self.shutdown.clone(),
        );

        let report = acceptor.run().await;

        // The acceptor only stops on completion or shutdown, and the generator follows
        // either within one critical section.
        if let Some(outcome) = election.join_generator().await {
            tracing::info!(
                "Worker {} generator ended: {:?} ({} emitted)",
                self.name,
                outcome,
                outcome.emitted()
            );
        }

        tracing::info!(
            "Worker {} done: consumed {} messages, {} routed to errors",
            self.name,
            report.consumed.len(),
            report.faulty
        );
        Ok(report)
    }
}
