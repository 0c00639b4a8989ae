//! Single-Writer Message Pool Library
//!
//! Defines the modules that make up a pool of identical worker processes which elect one
//! message generator among themselves and consume its output together.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`store`**: the shared key-value store all coordination goes through: an in-process
//!   `MemoryStore`, its HTTP server surface, and the `RemoteStore` client.
//! - **`coordination`**: the election protocol: generator and acceptor roles, the cadence
//!   and staleness policy, expiring locks, and the maintenance commands.
//! - **`config`**: the cluster-wide tuning knobs every worker must agree on.
//! - **`signals`**: graceful or suppressed handling of termination signals.

pub mod config;
pub mod coordination;
pub mod signals;
pub mod store;
