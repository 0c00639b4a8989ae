//! HTTP client for a store served by `msgpool store`.
//!
//! Every primitive is a single JSON `POST`. Transport failures of idempotent
//! primitives are retried with exponential backoff and jitter. `push`, `pop` and
//! `drain` are sent once: a lost response could otherwise duplicate or drop an entry.
//! A non-success status is an error without retry.

use super::SharedStore;
use super::protocol::*;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_millis(500);
const ATTEMPTS: usize = 3;
const SINGLE_ATTEMPT: usize = 1;

pub struct RemoteStore {
    base_url: String,
    http_client: reqwest::Client,
}

impl RemoteStore {
    /// Creates a client for the store at `base_url` (e.g. `http://127.0.0.1:6390`).
    pub fn new(base_url: &str) -> Self {
        let cleaned = base_url.trim_end_matches('/');
        let base_url = if cleaned.starts_with("http://") || cleaned.starts_with("https://") {
            cleaned.to_string()
        } else {
            format!("http://{}", cleaned)
        };

        Self {
            base_url,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T, R>(
        &self,
        endpoint: &str,
        payload: &T,
        timeout: Duration,
        attempts: usize,
    ) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.post_with_retry(url, payload, timeout, attempts).await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Store request {} failed: {}",
                endpoint,
                response.status()
            ));
        }

        Ok(response.json().await?)
    }

    async fn post_with_retry<T: Serialize>(
        &self,
        url: String,
        payload: &T,
        timeout: Duration,
        attempts: usize,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    tracing::debug!("Store request to {} failed (attempt {}): {}", url, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }
}

#[async_trait]
impl SharedStore for RemoteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let payload = KeyRequest {
            key: key.to_string(),
        };
        let response: ValueResponse = self
            .call(ENDPOINT_GET, &payload, REQUEST_TIMEOUT, ATTEMPTS)
            .await?;
        Ok(response.value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let payload = SetRequest {
            key: key.to_string(),
            value: value.to_string(),
        };
        let response: AckResponse = self
            .call(ENDPOINT_SET, &payload, REQUEST_TIMEOUT, ATTEMPTS)
            .await?;
        if !response.success {
            return Err(anyhow::anyhow!("Store rejected SET {}", key));
        }
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<usize> {
        let payload = DeleteRequest {
            keys: keys.iter().map(|key| key.to_string()).collect(),
        };
        let response: CountResponse = self
            .call(ENDPOINT_DELETE, &payload, REQUEST_TIMEOUT, ATTEMPTS)
            .await?;
        Ok(response.count)
    }

    async fn push(&self, list: &str, value: &str) -> Result<usize> {
        let payload = PushRequest {
            list: list.to_string(),
            value: value.to_string(),
        };
        let response: LenResponse = self
            .call(ENDPOINT_PUSH, &payload, REQUEST_TIMEOUT, SINGLE_ATTEMPT)
            .await?;
        Ok(response.len)
    }

    async fn pop(&self, list: &str, timeout: Duration) -> Result<Option<String>> {
        let payload = PopRequest {
            list: list.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };
        // The server parks the request for up to `timeout`; leave room for the round trip.
        let response: ValueResponse = self
            .call(ENDPOINT_POP, &payload, timeout + REQUEST_TIMEOUT, SINGLE_ATTEMPT)
            .await?;
        Ok(response.value)
    }

    async fn len(&self, list: &str) -> Result<usize> {
        let payload = ListRequest {
            list: list.to_string(),
        };
        let response: LenResponse = self
            .call(ENDPOINT_LEN, &payload, REQUEST_TIMEOUT, ATTEMPTS)
            .await?;
        Ok(response.len)
    }

    async fn drain(&self, list: &str) -> Result<Vec<String>> {
        let payload = ListRequest {
            list: list.to_string(),
        };
        let response: ValuesResponse = self
            .call(ENDPOINT_DRAIN, &payload, REQUEST_TIMEOUT, SINGLE_ATTEMPT)
            .await?;
        Ok(response.values)
    }

    async fn try_lock(&self, name: &str, token: &str, ttl: Duration) -> Result<bool> {
        let payload = LockRequest {
            name: name.to_string(),
            token: token.to_string(),
            ttl_ms: ttl.as_millis() as u64,
        };
        let response: LockResponse = self
            .call(ENDPOINT_LOCK, &payload, REQUEST_TIMEOUT, ATTEMPTS)
            .await?;
        Ok(response.acquired)
    }

    async fn unlock(&self, name: &str, token: &str) -> Result<bool> {
        let payload = UnlockRequest {
            name: name.to_string(),
            token: token.to_string(),
        };
        let response: UnlockResponse = self
            .call(ENDPOINT_UNLOCK, &payload, REQUEST_TIMEOUT, ATTEMPTS)
            .await?;
        Ok(response.released)
    }
}
