//! Codex 5-hour / weekly rate-limit windows, harvested from the newest
//! `rate_limits` events in Codex session logs
//! (`<codex home>/sessions/YYYY/MM/DD/*.jsonl`).

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc};
use qos_core::CacheSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::SnapshotSource;

/// Distinct `limit_id` buckets collected per scan.
const MAX_BUCKETS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    #[serde(default)]
    pub used_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_minutes: Option<u64>,
    /// Unix seconds or an RFC 3339 string, depending on the Codex version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<Value>,
}

impl RateWindow {
    /// Used share as a whole percent in `0..=100`.
    pub fn used_percent(&self) -> u8 {
        crate::clamp_percent(self.used_percent.unwrap_or(0.0))
    }

    pub fn resets_at(&self) -> Option<DateTime<Utc>> {
        match self.resets_at.as_ref()? {
            Value::Number(n) => {
                let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
                Utc.timestamp_opt(secs, 0).single()
            }
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodexBucket {
    pub limit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_name: Option<String>,
    #[serde(default)]
    pub primary: Option<RateWindow>,
    #[serde(default)]
    pub secondary: Option<RateWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodexRateLimits {
    pub buckets: BTreeMap<String, CodexBucket>,
}

impl CodexRateLimits {
    /// The `codex` bucket if present, else any bucket.
    pub fn main_bucket(&self) -> Option<&CodexBucket> {
        self.buckets
            .get("codex")
            .or_else(|| self.buckets.values().next())
    }
}

#[derive(Debug, Clone)]
pub struct CodexRateLimitScanner {
    sessions_dir: PathBuf,
}

impl CodexRateLimitScanner {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    /// Scan `today`'s and yesterday's session logs, newest file first, and
    /// return the first file that carries any rate-limit event.
    pub fn scan(&self, today: NaiveDate) -> Option<CodexRateLimits> {
        for day in [Some(today), today.pred_opt()].into_iter().flatten() {
            let dir = self
                .sessions_dir
                .join(format!("{:04}", day.year()))
                .join(format!("{:02}", day.month()))
                .join(format!("{:02}", day.day()));
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            let mut files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
                .collect();
            files.sort();
            for file in files.iter().rev() {
                if let Some(limits) = scan_file(file) {
                    return Some(limits);
                }
            }
        }
        None
    }
}

fn scan_file(path: &Path) -> Option<CodexRateLimits> {
    let content = fs::read_to_string(path).ok()?;
    let mut buckets = BTreeMap::new();
    for line in content.lines().rev() {
        if buckets.len() >= MAX_BUCKETS {
            break;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let Some(limits) = event.pointer("/payload/rate_limits") else {
            continue;
        };
        let Some(limit_id) = limits
            .get("limit_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        else {
            continue;
        };
        if buckets.contains_key(limit_id) {
            continue;
        }
        let window = |name: &str| {
            limits
                .get(name)
                .and_then(|v| serde_json::from_value::<RateWindow>(v.clone()).ok())
        };
        let bucket = CodexBucket {
            limit_id: limit_id.to_string(),
            limit_name: limits
                .get("limit_name")
                .and_then(Value::as_str)
                .map(String::from),
            primary: window("primary"),
            secondary: window("secondary"),
            timestamp: event
                .get("timestamp")
                .and_then(Value::as_str)
                .map(String::from),
        };
        buckets.insert(limit_id.to_string(), bucket);
    }
    (!buckets.is_empty()).then_some(CodexRateLimits { buckets })
}

#[async_trait]
impl SnapshotSource for CodexRateLimitScanner {
    type Payload = CodexRateLimits;

    fn cache_source(&self) -> CacheSource {
        CacheSource::CodexRateLimits
    }

    async fn fetch(&self) -> Option<CodexRateLimits> {
        self.scan(Local::now().date_naive())
    }
}
