//! Local requests-per-minute counter for Gemini calls.
//!
//! The file holds `{"timestamps": [epoch_ms, ...]}`. Recording prunes
//! entries outside the window; reading never writes.

use anyhow::{Context, Result};
use qos_core::lenient::value_to_epoch_millis;
use serde::Serialize;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};

pub const RPM_WINDOW_MS: i64 = 60_000;

/// Remaining seconds are reported in steps of this size.
const REMAINING_STEP_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RpmUsage {
    pub count: u32,
    pub limit: u32,
    pub percent: u8,
    /// Seconds until the oldest counted request leaves the window.
    pub remaining_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RpmTracker {
    path: PathBuf,
    limit: u32,
}

impl RpmTracker {
    pub fn new(path: impl Into<PathBuf>, limit: u32) -> Self {
        Self {
            path: path.into(),
            limit: limit.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_timestamps(&self) -> Vec<i64> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let Ok(parsed) = serde_json::from_str::<Value>(&content) else {
            return Vec::new();
        };
        parsed
            .get("timestamps")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(value_to_epoch_millis)
            .collect()
    }

    /// Count one request made at `now_ms`.
    pub fn record(&self, now_ms: i64) -> Result<()> {
        let lock_path = qos_lock::sidecar_lock_path(&self.path);
        let _lock = qos_lock::lock_exclusive(&lock_path, "rpm record")?;

        let mut timestamps: Vec<i64> = self
            .read_timestamps()
            .into_iter()
            .filter(|ts| in_window(*ts, now_ms))
            .collect();
        timestamps.push(now_ms);

        let body = serde_json::to_vec(&json!({ "timestamps": timestamps }))
            .context("Failed to serialize RPM tracker")?;
        qos_lock::write_atomic(&self.path, &body)
            .with_context(|| format!("Failed to write RPM tracker: {}", self.path.display()))
    }

    pub fn usage(&self, now_ms: i64) -> RpmUsage {
        let recent: Vec<i64> = self
            .read_timestamps()
            .into_iter()
            .filter(|ts| in_window(*ts, now_ms))
            .collect();
        let count = u32::try_from(recent.len()).unwrap_or(u32::MAX);
        let percent = crate::clamp_percent(f64::from(count) / f64::from(self.limit) * 100.0);
        let remaining_secs = recent
            .iter()
            .min()
            .map(|oldest| {
                let left_ms = (RPM_WINDOW_MS - (now_ms - oldest)).max(0) as u64;
                left_ms.div_ceil(1000).div_ceil(REMAINING_STEP_SECS) * REMAINING_STEP_SECS
            })
            .unwrap_or(0);
        RpmUsage {
            count,
            limit: self.limit,
            percent,
            remaining_secs,
        }
    }
}

/// Future-dated entries (clock skew) count as inside the window.
fn in_window(ts: i64, now_ms: i64) -> bool {
    now_ms - ts < RPM_WINDOW_MS
}
