//! Cadence policy shared by the generator (throttling) and the acceptor (staleness).
//!
//! Timestamps are wall-clock seconds since the Unix epoch, as stored under `start`.
//! Indices are 1-based; index `0` means "nothing emitted yet" and maps to `start`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// `start + interval * (index - 1)`.
pub fn expected_timestamp(start: f64, interval: Duration, index: u64) -> f64 {
    start + interval.as_secs_f64() * index.saturating_sub(1) as f64
}

/// How long to sleep from `now` until `target`; zero if `target` already passed or is
/// not representable.
pub fn delay_until(target: f64, now: f64) -> Duration {
    if target > now {
        Duration::try_from_secs_f64(target - now).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

/// `true` when the message at `last_index` is overdue by more than `max_interval`.
pub fn is_stale(
    start: f64,
    interval: Duration,
    last_index: u64,
    max_interval: Duration,
    now: f64,
) -> bool {
    let expected = expected_timestamp(start, interval, last_index);
    now - expected > max_interval.as_secs_f64()
}

/// Current wall-clock time in seconds.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
