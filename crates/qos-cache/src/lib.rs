//! Cached quota/usage snapshots: freshness gate, cache files, cache keys,
//! and background refresh scheduling.

pub mod entry;
pub mod gate;
pub mod key;
pub mod refresh;
pub mod store;

pub use entry::CacheEntry;
pub use gate::{CacheDecision, CacheReason, evaluate};
pub use key::{NO_CREDENTIAL, cache_key, credential_fingerprint};
pub use refresh::{
    ProcessRefreshScheduler, RefreshRequest, RefreshScheduler, serve_and_revalidate,
};
pub use store::{CacheFile, now_ms};
