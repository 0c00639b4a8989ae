use crate::store::SharedStore;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Names of the protocol entries in the shared store.
///
/// These are the wire contract between processes: every worker of a run must agree on them.
pub mod keys {
    /// Name of the process currently holding the generator role.
    pub const GENERATOR: &str = "generator";
    /// Wall-clock timestamp (seconds, decimal) of the first emitted message.
    pub const START: &str = "start";
    /// Highest enqueued index, or `count + 1` once the sequence is complete.
    pub const LAST_INDEX: &str = "last_index";
    /// Pending `index:payload` entries.
    pub const QUEUE: &str = "queue";
    /// Payloads classified as erroneous by an acceptor.
    pub const ERRORS: &str = "errors";
    pub const GEN_LOCK: &str = "gen_lock";
    pub const ACCEPT_LOCK: &str = "accept_lock";

    /// Everything `clean` resets between runs.
    pub const ALL: [&str; 7] = [
        GENERATOR,
        QUEUE,
        LAST_INDEX,
        START,
        GEN_LOCK,
        ACCEPT_LOCK,
        ERRORS,
    ];
}

/// Payload suffixes at or below this value are injected errors.
pub const ERROR_THRESHOLD: u32 = 5;

/// Name of a worker process, `<hostname>-<pid>`.
///
/// Used solely as the comparand for "who is the generator".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProcessName(pub String);

impl ProcessName {
    /// Derives the name of the current process.
    pub fn current() -> Self {
        let host = sysinfo::System::host_name()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        Self::from_parts(&host, std::process::id())
    }

    pub fn from_parts(host: &str, pid: u32) -> Self {
        Self(format!("{}-{}", host, pid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One queue entry: `<index>:<body>`, where a generated body is `message-<n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub index: u64,
    pub body: String,
}

impl Message {
    /// Synthesizes the message for `index` with a random suffix in `1..=100`.
    pub fn generate(index: u64) -> Self {
        use rand::Rng;
        let suffix: u32 = rand::thread_rng().gen_range(1..=100);
        Self::with_suffix(index, suffix)
    }

    pub fn with_suffix(index: u64, suffix: u32) -> Self {
        Self {
            index,
            body: format!("message-{}", suffix),
        }
    }

    /// The `<n>` of a `message-<n>` body, if the body has that shape.
    pub fn suffix(&self) -> Option<u32> {
        self.body.strip_prefix("message-")?.parse().ok()
    }

    /// Decides how an acceptor handles this message.
    pub fn disposition(&self) -> Disposition {
        match self.suffix() {
            Some(n) if n <= ERROR_THRESHOLD => Disposition::Faulty,
            Some(_) => Disposition::Regular,
            None => Disposition::Malformed,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.body)
    }
}

impl FromStr for Message {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let (index, body) = raw
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("Queue entry without index separator: {:?}", raw))?;
        let index = index
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid index in queue entry {:?}: {}", raw, e))?;

        Ok(Self {
            index,
            body: body.to_string(),
        })
    }
}

/// How an acceptor routes a consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Injected error: the payload goes to the `errors` list.
    Faulty,
    /// Normal processing (simulated delay of about one interval).
    Regular,
    /// Body is not `message-<n>`; routed to `errors` as well.
    Malformed,
}

/// Progress markers as read from the store, outside of any lock.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Progress {
    /// `None` until the first message of the run has been emitted.
    pub start: Option<f64>,
    /// `None` (or `0`) while no message has been emitted.
    pub last_index: Option<u64>,
}

impl Progress {
    pub async fn load(store: &dyn SharedStore) -> Result<Self> {
        Ok(Self {
            start: read_start(store).await?,
            last_index: read_last_index(store).await?,
        })
    }

    /// `true` once the completion sentinel `count + 1` has been written.
    pub fn is_complete(&self, count: u64) -> bool {
        self.last_index.is_some_and(|last| last > count)
    }
}

pub async fn read_start(store: &dyn SharedStore) -> Result<Option<f64>> {
    match store.get(keys::START).await? {
        Some(raw) => {
            let start = raw
                .trim()
                .parse::<f64>()
                .map_err(|e| anyhow::anyhow!("Invalid start timestamp {:?}: {}", raw, e))?;
            if !start.is_finite() {
                anyhow::bail!("Invalid start timestamp {:?}: not finite", raw);
            }
            Ok((start > 0.0).then_some(start))
        }
        None => Ok(None),
    }
}

pub async fn read_last_index(store: &dyn SharedStore) -> Result<Option<u64>> {
    match store.get(keys::LAST_INDEX).await? {
        Some(raw) => {
            let index = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("Invalid last_index {:?}: {}", raw, e))?;
            Ok(Some(index))
        }
        None => Ok(None),
    }
}
