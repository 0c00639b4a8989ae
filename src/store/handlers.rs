use axum::{Extension, Json, Router, http::StatusCode, routing::post};
use std::sync::Arc;
use std::time::Duration;

use super::SharedStore;
use super::memory::MemoryStore;
use super::protocol::*;

/// Upper bound on how long a single pop request may park on the server.
const MAX_POP_WAIT: Duration = Duration::from_secs(30);

/// Builds the HTTP surface of the `store` server around a shared `MemoryStore`.
pub fn router(store: Arc<MemoryStore>) -> Router {
    Router::new()
        .route(ENDPOINT_GET, post(handle_get))
        .route(ENDPOINT_SET, post(handle_set))
        .route(ENDPOINT_DELETE, post(handle_delete))
        .route(ENDPOINT_PUSH, post(handle_push))
        .route(ENDPOINT_POP, post(handle_pop))
        .route(ENDPOINT_LEN, post(handle_len))
        .route(ENDPOINT_DRAIN, post(handle_drain))
        .route(ENDPOINT_LOCK, post(handle_lock))
        .route(ENDPOINT_UNLOCK, post(handle_unlock))
        .layer(Extension(store))
}

pub async fn handle_get(
    Extension(store): Extension<Arc<MemoryStore>>,
    Json(req): Json<KeyRequest>,
) -> (StatusCode, Json<ValueResponse>) {
    match store.get(&req.key).await {
        Ok(value) => (StatusCode::OK, Json(ValueResponse { value })),
        Err(e) => {
            tracing::error!("Failed to get {}: {}", req.key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ValueResponse { value: None }),
            )
        }
    }
}

pub async fn handle_set(
    Extension(store): Extension<Arc<MemoryStore>>,
    Json(req): Json<SetRequest>,
) -> (StatusCode, Json<AckResponse>) {
    match store.set(&req.key, &req.value).await {
        Ok(()) => {
            tracing::trace!("SET {} = {}", req.key, req.value);
            (StatusCode::OK, Json(AckResponse { success: true }))
        }
        Err(e) => {
            tracing::error!("Failed to set {}: {}", req.key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AckResponse { success: false }),
            )
        }
    }
}

pub async fn handle_delete(
    Extension(store): Extension<Arc<MemoryStore>>,
    Json(req): Json<DeleteRequest>,
) -> (StatusCode, Json<CountResponse>) {
    let keys: Vec<&str> = req.keys.iter().map(String::as_str).collect();

    match store.delete(&keys).await {
        Ok(count) => {
            tracing::info!("Deleted {} entries ({} keys requested)", count, keys.len());
            (StatusCode::OK, Json(CountResponse { count }))
        }
        Err(e) => {
            tracing::error!("Failed to delete keys: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CountResponse { count: 0 }),
            )
        }
    }
}

pub async fn handle_push(
    Extension(store): Extension<Arc<MemoryStore>>,
    Json(req): Json<PushRequest>,
) -> (StatusCode, Json<LenResponse>) {
    match store.push(&req.list, &req.value).await {
        Ok(len) => (StatusCode::OK, Json(LenResponse { len })),
        Err(e) => {
            tracing::error!("Failed to push to {}: {}", req.list, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(LenResponse { len: 0 }),
            )
        }
    }
}

pub async fn handle_pop(
    Extension(store): Extension<Arc<MemoryStore>>,
    Json(req): Json<PopRequest>,
) -> (StatusCode, Json<ValueResponse>) {
    let timeout = Duration::from_millis(req.timeout_ms).min(MAX_POP_WAIT);

    match store.pop(&req.list, timeout).await {
        Ok(value) => (StatusCode::OK, Json(ValueResponse { value })),
        Err(e) => {
            tracing::error!("Failed to pop from {}: {}", req.list, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ValueResponse { value: None }),
            )
        }
    }
}

pub async fn handle_len(
    Extension(store): Extension<Arc<MemoryStore>>,
    Json(req): Json<ListRequest>,
) -> (StatusCode, Json<LenResponse>) {
    match store.len(&req.list).await {
        Ok(len) => (StatusCode::OK, Json(LenResponse { len })),
        Err(e) => {
            tracing::error!("Failed to read length of {}: {}", req.list, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(LenResponse { len: 0 }),
            )
        }
    }
}

pub async fn handle_drain(
    Extension(store): Extension<Arc<MemoryStore>>,
    Json(req): Json<ListRequest>,
) -> (StatusCode, Json<ValuesResponse>) {
    match store.drain(&req.list).await {
        Ok(values) => {
            tracing::info!("Drained {} entries from {}", values.len(), req.list);
            (StatusCode::OK, Json(ValuesResponse { values }))
        }
        Err(e) => {
            tracing::error!("Failed to drain {}: {}", req.list, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ValuesResponse { values: Vec::new() }),
            )
        }
    }
}

pub async fn handle_lock(
    Extension(store): Extension<Arc<MemoryStore>>,
    Json(req): Json<LockRequest>,
) -> (StatusCode, Json<LockResponse>) {
    let ttl = Duration::from_millis(req.ttl_ms);

    match store.try_lock(&req.name, &req.token, ttl).await {
        Ok(acquired) => {
            tracing::trace!("LOCK {} by {}: {}", req.name, req.token, acquired);
            (StatusCode::OK, Json(LockResponse { acquired }))
        }
        Err(e) => {
            tracing::error!("Failed to lock {}: {}", req.name, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(LockResponse { acquired: false }),
            )
        }
    }
}

pub async fn handle_unlock(
    Extension(store): Extension<Arc<MemoryStore>>,
    Json(req): Json<UnlockRequest>,
) -> (StatusCode, Json<UnlockResponse>) {
    match store.unlock(&req.name, &req.token).await {
        Ok(released) => (StatusCode::OK, Json(UnlockResponse { released })),
        Err(e) => {
            tracing::error!("Failed to unlock {}: {}", req.name, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UnlockResponse { released: false }),
            )
        }
    }
}
