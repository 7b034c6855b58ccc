//! Producers of the cached usage snapshots shown by the status view, plus
//! the local Gemini RPM counter, the Claude usage estimate and
//! active-account resolution.

pub mod accounts;
pub mod claude_usage;
pub mod codex;
pub mod codex_auth;
pub mod gemini_quota;
pub mod gemini_session;
pub mod rpm;

use async_trait::async_trait;
use qos_cache::CacheFile;
use qos_core::CacheSource;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use accounts::{AccountDirectory, AccountEntry};
pub use claude_usage::{ClaudeTokenStats, ClaudeUsage, WindowEstimate, format_duration};
pub use codex::{CodexBucket, CodexRateLimitScanner, CodexRateLimits, RateWindow};
pub use codex_auth::read_codex_email;
pub use gemini_quota::{GeminiAuth, GeminiQuota, GeminiQuotaClient, OAuthCreds, QuotaBucket};
pub use gemini_session::{GeminiSessionScanner, GeminiSessionTokens};
pub use rpm::{RpmTracker, RpmUsage};

/// Something that can produce a fresh snapshot for one cache file.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    type Payload: Serialize + DeserializeOwned + Clone + Send;

    fn cache_source(&self) -> CacheSource;

    /// Key binding the snapshot to an account/credential; `None` for
    /// sources that are not account-bound.
    fn cache_key(&self) -> Option<String> {
        None
    }

    /// `None` means "unavailable"; the previous cache entry stays in place.
    async fn fetch(&self) -> Option<Self::Payload>;
}

/// One fetch-and-write cycle of `source` into `cache`.
pub async fn refresh_into<S: SnapshotSource>(
    source: &S,
    cache: &CacheFile<S::Payload>,
) -> Option<S::Payload> {
    let key = source.cache_key();
    let payload = cache.refresh(key.as_deref(), || source.fetch()).await;
    tracing::debug!(
        source = %source.cache_source(),
        refreshed = payload.is_some(),
        "Refresh cycle finished"
    );
    payload
}

/// Round to a whole percent in `0..=100`; non-finite input reads as 0.
pub fn clamp_percent(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}
