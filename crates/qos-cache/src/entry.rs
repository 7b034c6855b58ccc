use qos_core::lenient;
use serde::{Deserialize, Serialize};

/// One cached snapshot as stored on disk:
/// `{"timestamp": <epoch ms>, "cacheKey": "...", "payload": ...}`.
///
/// `cache_key` is absent for sources that are not account-bound and for
/// entries written before keys were introduced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    #[serde(default, deserialize_with = "lenient::epoch_millis")]
    pub timestamp: Option<i64>,
    #[serde(
        rename = "cacheKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_key: Option<String>,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    pub fn new(timestamp_ms: i64, cache_key: Option<String>, payload: T) -> Self {
        Self {
            timestamp: Some(timestamp_ms),
            cache_key,
            payload,
        }
    }

    /// Milliseconds since the entry was written; `None` when the timestamp
    /// is missing or unreadable.
    pub fn age_ms(&self, now_ms: i64) -> Option<i64> {
        self.timestamp.map(|ts| now_ms.saturating_sub(ts))
    }
}
