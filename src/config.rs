//! Worker configuration.
//!
//! Every process of a run must be started with the same values: the cadence and the
//! staleness threshold are evaluated independently by each acceptor.

use anyhow::{Result, bail};
use std::time::Duration;

/// What a worker does when it receives SIGINT or SIGTERM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalPolicy {
    /// Finish the current critical section, release locks, exit.
    #[default]
    Graceful,
    /// Log and ignore the signal; only a forceful kill stops the worker.
    Ignore,
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Cadence between two consecutive emissions.
    pub interval: Duration,
    /// How far past its expected timestamp the progress marker may lag before the
    /// generator is judged stale.
    pub max_interval: Duration,
    /// Number of messages in the sequence (`N`).
    pub message_count: u64,
    /// Bounded wait of a single queue pop; also the acceptor's polling period when idle.
    pub poll_timeout: Duration,
    /// Bounded wait when acquiring `gen_lock` or `accept_lock`.
    pub lock_wait: Duration,
    /// Expiry of a held lock, after which another process may take it over.
    pub lock_ttl: Duration,
    pub signal_policy: SignalPolicy,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_interval: Duration::from_millis(900),
            message_count: 100,
            poll_timeout: Duration::from_millis(250),
            lock_wait: Duration::from_millis(500),
            lock_ttl: Duration::from_secs(5),
            signal_policy: SignalPolicy::Graceful,
        }
    }
}

impl ClusterConfig {
    /// The `last_index` value that marks the sequence as complete.
    pub fn completion_sentinel(&self) -> u64 {
        self.message_count.saturating_add(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.message_count == 0 {
            bail!("message count must be at least 1");
        }
        if self.message_count == u64::MAX {
            bail!("message count must leave room for the completion sentinel");
        }
        if self.interval.is_zero() {
            bail!("interval must be greater than zero");
        }
        if self.max_interval <= self.interval {
            bail!(
                "max interval ({:?}) must exceed the interval ({:?}), otherwise every generator looks stale",
                self.max_interval,
                self.interval
            );
        }
        if self.poll_timeout.is_zero() {
            bail!("poll timeout must be greater than zero");
        }
        if self.lock_ttl <= self.lock_wait {
            bail!(
                "lock ttl ({:?}) must exceed the lock wait ({:?})",
                self.lock_ttl,
                self.lock_wait
            );
        }
        Ok(())
    }
}
