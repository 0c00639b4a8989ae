//! Operator commands run between (or alongside) worker runs.

use super::types::{Progress, keys};
use crate::store::SharedStore;

use anyhow::{Context, Result};
use serde::Serialize;

/// Snapshot of the protocol state, as printed by `msgpool status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStatus {
    pub generator: Option<String>,
    pub start: Option<f64>,
    pub last_index: Option<u64>,
    pub queue_len: usize,
    pub errors_len: usize,
}

/// Deletes every protocol key, resetting the store for a new run.
pub async fn clean(store: &dyn SharedStore) -> Result<usize> {
    let removed = store
        .delete(&keys::ALL)
        .await
        .context("Failed to clean protocol keys")?;
    tracing::info!("Cleaned {} protocol entries", removed);
    Ok(removed)
}

/// Removes and returns every entry of the `errors` list.
pub async fn drain_errors(store: &dyn SharedStore) -> Result<Vec<String>> {
    let errors = store
        .drain(keys::ERRORS)
        .await
        .context("Failed to drain the errors list")?;
    tracing::debug!("Drained {} error entries", errors.len());
    Ok(errors)
}

pub async fn status(store: &dyn SharedStore) -> Result<ClusterStatus> {
    let progress = Progress::load(store).await?;

    Ok(ClusterStatus {
        generator: store.get(keys::GENERATOR).await?,
        start: progress.start,
        last_index: progress.last_index,
        queue_len: store.len(keys::QUEUE).await?,
        errors_len: store.len(keys::ERRORS).await?,
    })
}
