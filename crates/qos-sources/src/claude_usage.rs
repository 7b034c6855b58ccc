//! Claude usage estimate from the session token counters.
//!
//! There is no quota API for Claude, so the 5-hour and weekly windows are
//! estimated against fixed token caps. Cache reads are weighted at 10%.

use qos_core::lenient;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::clamp_percent;

pub const FIVE_HOUR_MS: i64 = 5 * 60 * 60 * 1000;
pub const SEVEN_DAY_MS: i64 = 7 * 24 * 60 * 60 * 1000;
pub const FIVE_HOUR_TOKEN_CAP: u64 = 2_000_000;
pub const WEEK_TOKEN_CAP: u64 = 20_000_000;

/// `session-token-stats.json`, as written by the session hooks.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaudeTokenStats {
    #[serde(default, deserialize_with = "lenient::millis")]
    pub total_input_tokens: u64,
    #[serde(default, deserialize_with = "lenient::millis")]
    pub total_cache_creation: u64,
    #[serde(default, deserialize_with = "lenient::millis")]
    pub total_cache_read: u64,
    #[serde(default, deserialize_with = "lenient::epoch_millis")]
    pub start_time: Option<i64>,
}

impl ClaudeTokenStats {
    /// Missing or malformed files read as all zeros.
    pub fn load(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|error| {
            tracing::debug!(path = %path.display(), %error, "Ignoring malformed token stats");
            Self::default()
        })
    }

    pub fn weighted_tokens(&self) -> u64 {
        let cache_read = (self.total_cache_read as f64 * 0.1).round() as u64;
        self.total_input_tokens
            .saturating_add(self.total_cache_creation)
            .saturating_add(cache_read)
    }

    /// Time since the session started; 0 without a start time.
    pub fn elapsed_ms(&self, now_ms: i64) -> i64 {
        self.start_time
            .map(|start| now_ms.saturating_sub(start).max(0))
            .unwrap_or(0)
    }

    pub fn usage(&self, now_ms: i64) -> ClaudeUsage {
        let tokens = self.weighted_tokens();
        let elapsed = self.elapsed_ms(now_ms);
        ClaudeUsage {
            five_hour: estimate_window_usage(tokens, FIVE_HOUR_TOKEN_CAP, elapsed, FIVE_HOUR_MS),
            weekly: estimate_window_usage(tokens, WEEK_TOKEN_CAP, elapsed, SEVEN_DAY_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEstimate {
    pub percent: u8,
    /// Projected time until the cap is hit at the current pace, bounded by
    /// the window. `None` below 1% or without elapsed time.
    pub remaining_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaudeUsage {
    pub five_hour: WindowEstimate,
    pub weekly: WindowEstimate,
}

pub fn estimate_window_usage(
    tokens: u64,
    cap_tokens: u64,
    elapsed_ms: i64,
    window_ms: i64,
) -> WindowEstimate {
    let percent = clamp_percent(tokens as f64 / cap_tokens.max(1) as f64 * 100.0);
    if percent < 1 || elapsed_ms <= 0 {
        return WindowEstimate {
            percent,
            remaining_ms: None,
        };
    }
    let projected = elapsed_ms as f64 * (100.0 / f64::from(percent));
    let remaining = (projected - elapsed_ms as f64).clamp(0.0, window_ms as f64) as i64;
    WindowEstimate {
        percent,
        remaining_ms: Some(remaining).filter(|ms| *ms > 0),
    }
}

/// `3d4h`, `2h05m`, `45m`.
pub fn format_duration(ms: i64) -> String {
    let total_minutes = ms.max(0) / 60_000;
    let days = total_minutes / (60 * 24);
    let hours = (total_minutes % (60 * 24)) / 60;
    let minutes = total_minutes % 60;
    if days > 0 {
        format!("{days}d{hours}h")
    } else if hours > 0 {
        format!("{hours}h{minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}
