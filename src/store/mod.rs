//! Shared Store Module
//!
//! The only channel through which worker processes coordinate. Every piece of protocol
//! state (the generator name, the progress marker, the message queue, the locks) lives
//! here, never inside a process.
//!
//! ## Core Concepts
//! - **Scalars**: plain `GET`/`SET` string keys.
//! - **Lists**: append-only FIFO lists with a bounded blocking pop.
//! - **Locks**: advisory named locks held under a caller-chosen token with an expiry,
//!   so a crashed holder cannot wedge the cluster.
//!
//! ## Backends
//! - **`memory`**: `MemoryStore`, an in-process store used by tests, single-process runs
//!   and the `store` server.
//! - **`client`**: `RemoteStore`, an HTTP client for a `MemoryStore` served by another process.
//! - **`handlers`** / **`protocol`**: the HTTP surface of the `store` server.

pub mod client;
pub mod handlers;
pub mod memory;
pub mod protocol;


use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Atomic primitives the coordination protocol is built on.
///
/// Implementations must make every single call atomic with respect to every other call.
/// No multi-key transactions are required.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Reads a scalar key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a scalar key, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes scalars, lists and locks with the given names.
    /// Returns how many entries existed.
    async fn delete(&self, keys: &[&str]) -> Result<usize>;

    /// Appends to the tail of a list and returns its new length.
    async fn push(&self, list: &str, value: &str) -> Result<usize>;

    /// Pops the head of a list, waiting up to `timeout` for an entry to arrive.
    async fn pop(&self, list: &str, timeout: Duration) -> Result<Option<String>>;

    async fn len(&self, list: &str) -> Result<usize>;

    /// Removes and returns every entry of a list, head first.
    async fn drain(&self, list: &str) -> Result<Vec<String>>;

    /// Takes the lock `name` for `token` unless another token holds an unexpired claim.
    /// Re-acquiring with the holding token refreshes the expiry.
    async fn try_lock(&self, name: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Releases the lock only if `token` still holds it.
    async fn unlock(&self, name: &str, token: &str) -> Result<bool>;
}
