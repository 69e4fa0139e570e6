//! Geomagnetic index feed and its persisted cache
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use hifitime::Epoch;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::Error, grid::as_f64, time::iso8601};

/// Latest index value, as persisted on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexCacheEntry {
    /// Index value
    pub value: Option<f64>,
    /// Feed timestamp of this value
    pub valid_at: Option<String>,
    /// Date of the fetch (ISO8601)
    pub fetched_at: String,
}

impl IndexCacheEntry {
    /// Parses the feed response: an array of `[timestamp, value, ..]` rows,
    /// possibly starting with a header row. The last row is authoritative.
    /// Rows may also be objects (`time_tag` + `Kp` / `kp_index` / `estimated_kp`).
    pub fn from_feed(body: &str, fetched_at: Epoch) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(body)?;

        let rows = value
            .as_array()
            .ok_or_else(|| Error::MalformedPayload("index feed is not an array".to_string()))?;

        let last = rows.last().ok_or(Error::EmptyResponse)?;

        let (valid_at, value) = match last {
            Value::Array(columns) => (columns.first(), columns.get(1).and_then(as_f64)),
            Value::Object(map) => (
                map.get("time_tag"),
                ["Kp", "kp_index", "estimated_kp", "kp"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(as_f64)),
            ),
            _ => {
                return Err(Error::MalformedPayload(
                    "unexpected index feed row".to_string(),
                ))
            },
        };

        // header only
        if rows.len() == 1 && value.is_none() {
            return Err(Error::EmptyResponse);
        }

        let valid_at = valid_at.and_then(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        });

        Ok(Self {
            value,
            valid_at,
            fetched_at: iso8601(fetched_at),
        })
    }

    /// Loads the persisted entry
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persists this entry, replacing any previous one
    pub fn store(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// [IndexFeed] is the remote index provider
pub trait IndexFeed {
    /// Returns the raw feed response
    fn fetch_latest(&self) -> Result<String, Error>;
}

/// [IndexFeed] over HTTP
pub struct HttpIndexFeed {
    url: String,
    agent: ureq::Agent,
}

impl HttpIndexFeed {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("spacewx-logger/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            url: url.to_string(),
        }
    }
}

impl IndexFeed for HttpIndexFeed {
    fn fetch_latest(&self) -> Result<String, Error> {
        debug!("index: GET {}", self.url);
        let response = self.agent.get(&self.url).call()?;
        Ok(response.into_string()?)
    }
}

/// [ExternalIndexCache] refreshes the index on its own cadence
/// and falls back to the persisted value when the feed is unavailable.
pub struct ExternalIndexCache<F: IndexFeed> {
    feed: F,
    path: Option<PathBuf>,
    refresh: Duration,
    entry: Option<IndexCacheEntry>,
    last_success: Option<Instant>,
}

impl<F: IndexFeed> ExternalIndexCache<F> {
    /// Creates a new [ExternalIndexCache], loading the persisted entry if any.
    /// ## Inputs
    /// - feed: [IndexFeed]
    /// - path: durable storage, None for in-memory operation
    /// - refresh: minimal delay between two successful refreshes
    pub fn new(feed: F, path: Option<PathBuf>, refresh: Duration) -> Self {
        let entry = path
            .as_deref()
            .filter(|path| path.exists())
            .and_then(|path| match IndexCacheEntry::load(path) {
                Ok(entry) => {
                    info!(
                        "index: loaded {:?} (valid at {:?}) from {}",
                        entry.value,
                        entry.valid_at,
                        path.display()
                    );
                    Some(entry)
                },
                Err(e) => {
                    warn!("index: ignoring cache {}: {}", path.display(), e);
                    None
                },
            });

        Self {
            feed,
            path,
            refresh,
            entry,
            last_success: None,
        }
    }

    /// Currently held [IndexCacheEntry]
    pub fn entry(&self) -> Option<&IndexCacheEntry> {
        self.entry.as_ref()
    }

    /// Returns (value, valid_at), refreshing first if due.
    pub fn get(&mut self, now: Epoch) -> (Option<f64>, Option<String>) {
        self.get_at(Instant::now(), now)
    }

    /// [Self::get] at this monotonic instant
    pub fn get_at(&mut self, instant: Instant, now: Epoch) -> (Option<f64>, Option<String>) {
        let due = match self.last_success {
            Some(last) => instant.saturating_duration_since(last) > self.refresh,
            None => true,
        };

        if due {
            match self.refresh(now) {
                Ok(entry) => {
                    debug!("index: {:?} (valid at {:?})", entry.value, entry.valid_at);
                    self.entry = Some(entry);
                    self.last_success = Some(instant);
                    self.persist();
                },
                Err(e) => {
                    warn!("index: refresh failed: {}", e);
                },
            }
        }

        match &self.entry {
            Some(entry) => (entry.value, entry.valid_at.clone()),
            None => (None, None),
        }
    }

    fn refresh(&self, now: Epoch) -> Result<IndexCacheEntry, Error> {
        let body = self.feed.fetch_latest()?;
        IndexCacheEntry::from_feed(&body, now)
    }

    fn persist(&self) {
        if let (Some(path), Some(entry)) = (&self.path, &self.entry) {
            if let Err(e) = entry.store(path) {
                error!("index: failed to persist {}: {}", path.display(), e);
            }
        }
    }
}
