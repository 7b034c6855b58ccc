use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::future::Future;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::entry::CacheEntry;
use crate::gate::{CacheDecision, evaluate};

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A single-source cache file holding one [`CacheEntry`].
#[derive(Debug, Clone)]
pub struct CacheFile<T> {
    path: PathBuf,
    _payload: PhantomData<fn() -> T>,
}

impl<T> CacheFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _payload: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, unreadable, or undecodable files all read as `None`.
    pub fn read(&self) -> Option<CacheEntry<T>> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::debug!(path = %self.path.display(), %error, "Ignoring undecodable cache file");
                None
            }
        }
    }

    pub fn write(&self, cache_key: Option<&str>, payload: &T, timestamp_ms: i64) -> Result<()> {
        let entry = CacheEntry::new(timestamp_ms, cache_key.map(String::from), payload);
        let json = serde_json::to_vec(&entry).context("Failed to serialize cache entry")?;
        qos_lock::write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write cache: {}", self.path.display()))
    }

    pub fn evaluate(
        &self,
        cache_key: Option<&str>,
        stale_budget: Duration,
        force_refresh: bool,
        now_ms: i64,
    ) -> CacheDecision<T> {
        evaluate(self.read(), cache_key, stale_budget, force_refresh, now_ms)
    }

    /// One fetch-and-write cycle.
    ///
    /// A successful fetch overwrites the file and is returned. A failed one
    /// (`None`) leaves the file untouched and yields the previous payload,
    /// as long as it belongs to `cache_key`.
    pub async fn refresh<F, Fut>(&self, cache_key: Option<&str>, fetch: F) -> Option<T>
    where
        T: Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let fallback = self.evaluate(cache_key, Duration::ZERO, true, now_ms()).payload;
        match fetch().await {
            Some(fresh) => {
                if let Err(error) = self.write(cache_key, &fresh, now_ms()) {
                    tracing::warn!(error = %format!("{error:#}"), "Failed to persist refreshed cache");
                }
                Some(fresh)
            }
            None => {
                tracing::debug!(path = %self.path.display(), "Fetch returned no data, keeping previous cache");
                fallback
            }
        }
    }
}
