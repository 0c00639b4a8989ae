//! Coordination Module
//!
//! Single-writer election over the shared store: exactly one process at a time emits the
//! numbered sequence `1..=N`, every process consumes it, and a stalled emitter is replaced
//! by whichever acceptor notices first.
//!
//! ## Core Concepts
//! - **Generator role**: held by the process named under `generator`. Emits one message per
//!   `gen_lock` critical section, at a fixed cadence anchored on `start`.
//! - **Acceptor**: runs in every process. Pops and processes messages, and under
//!   `accept_lock` judges whether the generator has fallen behind by more than `max_interval`.
//! - **Failover**: the acceptor that judged the generator stale claims the role; the new
//!   generator resumes strictly after the persisted `last_index`.
//! - **Completion**: `last_index = N + 1` marks the end of the run; workers exit once the
//!   queue is drained.
//!
//! ## Modules
//! - **`types`**: protocol keys, process identity, the message format.
//! - **`cadence`**: expected timestamps and the staleness rule.
//! - **`lock`**: token-owned, expiring lock guard.
//! - **`election`**, **`generator`**, **`acceptor`**: the roles.
//! - **`worker`**: wires the roles of one process together.
//! - **`maintenance`**: `clean`, `errors` and `status`.

pub mod acceptor;
pub mod cadence;
pub mod election;
pub mod generator;
pub mod lock;
pub mod maintenance;
pub mod types;
pub mod worker;

#[cfg(test)]
mod tests;
