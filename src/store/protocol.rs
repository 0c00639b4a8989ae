//! Store Network Protocol
//!
//! Defines the API endpoints and Data Transfer Objects (DTOs) used between a worker's
//! `RemoteStore` and the `store` server. Each endpoint maps one-to-one onto a
//! [`SharedStore`](super::SharedStore) primitive.
//!
//! Everything is `POST` with a JSON body so keys never need URL escaping.

use serde::{Deserialize, Serialize};

// --- API Endpoints ---

pub const ENDPOINT_GET: &str = "/store/get";
pub const ENDPOINT_SET: &str = "/store/set";
pub const ENDPOINT_DELETE: &str = "/store/delete";
pub const ENDPOINT_PUSH: &str = "/store/push";
/// Blocking pop; the server holds the request open for up to `timeout_ms`.
pub const ENDPOINT_POP: &str = "/store/pop";
pub const ENDPOINT_LEN: &str = "/store/len";
pub const ENDPOINT_DRAIN: &str = "/store/drain";
pub const ENDPOINT_LOCK: &str = "/store/lock";
pub const ENDPOINT_UNLOCK: &str = "/store/unlock";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PushRequest {
    pub list: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PopRequest {
    pub list: String,
    /// How long the server may wait for an entry before answering `None`.
    pub timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListRequest {
    pub list: String,
}

/// Request to take or refresh an advisory lock.
///
/// The `token` identifies the holder; only the same token may release the lock
/// before `ttl_ms` elapses.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockRequest {
    pub name: String,
    pub token: String,
    pub ttl_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub name: String,
    pub token: String,
}

/// Response for reads of a single optional value (`get`, `pop`).
#[derive(Debug, Serialize, Deserialize)]
pub struct ValueResponse {
    pub value: Option<String>,
}

/// Standard acknowledgment for writes.
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LenResponse {
    pub len: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValuesResponse {
    pub values: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockResponse {
    pub acquired: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub released: bool,
}
