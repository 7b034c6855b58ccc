//! User configuration for qos-hud (`~/.config/qos-hud/config.toml`).
//!
//! Every key is optional. The controller thresholds live here rather than
//! in code so they can be tuned per machine:
//! - AIMD tunables shared by all providers (`[policy]`)
//! - per-provider bounds (`[providers.<name>]`)
//! - cache staleness budgets and the fetch timeout (`[cache]`)
//! - Gemini request-rate limit (`[gemini]`)

use anyhow::{Context, Result};
use qos_core::{CacheSource, FailureKind, PolicyTable, Provider, ProviderPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Keyed by provider name (`codex`, `gemini`). Unknown names are ignored.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderOverride>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Tunables of the success/failure state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Consecutive successes needed to raise `max_parallel` by one.
    pub success_streak_step_up: u32,
    /// EWMA latency above which a success is not considered stable.
    pub stable_latency_ms: u64,
    /// Multiplier applied to `max_parallel` on any failure.
    pub decrease_ratio: f64,
    /// Weight of the newest latency sample in the EWMA.
    pub ewma_alpha: f64,
    pub rate_limit_cooldown_secs: u64,
    pub timeout_cooldown_secs: u64,
    pub default_cooldown_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            success_streak_step_up: 3,
            stable_latency_ms: 45_000,
            decrease_ratio: 0.5,
            ewma_alpha: 0.3,
            rate_limit_cooldown_secs: 180,
            timeout_cooldown_secs: 120,
            default_cooldown_secs: 60,
        }
    }
}

impl PolicyConfig {
    pub fn cooldown_secs(&self, kind: FailureKind) -> u64 {
        match kind {
            FailureKind::RateLimit => self.rate_limit_cooldown_secs,
            FailureKind::Timeout => self.timeout_cooldown_secs,
            FailureKind::Auth | FailureKind::Default => self.default_cooldown_secs,
        }
    }

    /// Decrease ratio restricted to `(0, 1]`; out-of-range values fall back to 0.5.
    pub fn effective_decrease_ratio(&self) -> f64 {
        if self.decrease_ratio > 0.0 && self.decrease_ratio <= 1.0 {
            self.decrease_ratio
        } else {
            0.5
        }
    }

    /// EWMA weight restricted to `(0, 1]`; out-of-range values fall back to 0.3.
    pub fn effective_ewma_alpha(&self) -> f64 {
        if self.ewma_alpha > 0.0 && self.ewma_alpha <= 1.0 {
            self.ewma_alpha
        } else {
            0.3
        }
    }

    pub fn effective_step_up(&self) -> u32 {
        self.success_streak_step_up.max(1)
    }
}

/// Per-provider override of the built-in [`ProviderPolicy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_parallel: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_parallel: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_cap: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_threshold: Option<u32>,
}

impl ProviderOverride {
    pub fn apply(&self, base: ProviderPolicy) -> ProviderPolicy {
        ProviderPolicy {
            initial_parallel: self.initial_parallel.unwrap_or(base.initial_parallel),
            min_parallel: self.min_parallel.unwrap_or(base.min_parallel),
            initial_cap: self.initial_cap.unwrap_or(base.initial_cap),
            hard_limit: self.hard_limit.unwrap_or(base.hard_limit),
            growth_threshold: self.growth_threshold.unwrap_or(base.growth_threshold),
        }
        .sanitized()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub codex_rate_limits_stale_secs: u64,
    pub gemini_quota_stale_secs: u64,
    pub gemini_session_stale_secs: u64,
    /// Upper bound for one network fetch.
    pub fetch_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            codex_rate_limits_stale_secs: 15,
            gemini_quota_stale_secs: 300,
            gemini_session_stale_secs: 15,
            fetch_timeout_ms: 3_000,
        }
    }
}

impl CacheConfig {
    pub fn stale_budget(&self, source: CacheSource) -> Duration {
        let secs = match source {
            CacheSource::CodexRateLimits => self.codex_rate_limits_stale_secs,
            CacheSource::GeminiQuota => self.gemini_quota_stale_secs,
            CacheSource::GeminiSession => self.gemini_session_stale_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Requests per minute allowed for the OAuth personal tier.
    pub rpm_limit: u32,
    /// Quota bucket shown when the active model has none.
    pub fallback_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            rpm_limit: 60,
            fallback_model: "gemini-3-flash-preview".to_string(),
        }
    }
}

impl GlobalConfig {
    /// Load from `$QOS_HUD_CONFIG` or `~/.config/qos-hud/config.toml`.
    ///
    /// Returns `Default` if the file does not exist or the config directory
    /// cannot be determined (e.g., no HOME in containers).
    pub fn load() -> Result<Self> {
        match paths::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Like [`GlobalConfig::load`], but a broken file only costs a warning.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|error| {
            tracing::warn!(error = %format!("{error:#}"), "Ignoring unreadable config, using defaults");
            Self::default()
        })
    }

    pub fn provider_policy(&self, provider: Provider) -> ProviderPolicy {
        let base = provider.default_policy();
        match self.providers.get(provider.as_str()) {
            Some(over) => over.apply(base),
            None => base,
        }
    }

    pub fn policy_table(&self) -> PolicyTable {
        Provider::ALL
            .iter()
            .fold(PolicyTable::builtin(), |table, provider| {
                table.with(*provider, self.provider_policy(*provider))
            })
    }

    /// Effective configuration as TOML, with built-in provider bounds filled in.
    pub fn to_effective_toml(&self) -> Result<String> {
        let mut effective = self.clone();
        for provider in Provider::ALL {
            let policy = self.provider_policy(provider);
            effective.providers.insert(
                provider.as_str().to_string(),
                ProviderOverride {
                    initial_parallel: Some(policy.initial_parallel),
                    min_parallel: Some(policy.min_parallel),
                    initial_cap: Some(policy.initial_cap),
                    hard_limit: Some(policy.hard_limit),
                    growth_threshold: Some(policy.growth_threshold),
                },
            );
        }
        toml::to_string_pretty(&effective).context("Failed to serialize config")
    }

    pub fn default_template() -> String {
        r#"# qos-hud configuration
# Location: ~/.config/qos-hud/config.toml (override with QOS_HUD_CONFIG)
#
# All keys are optional; the values shown are the built-in defaults.

[policy]
# success_streak_step_up = 3      # successes before max_parallel += 1
# stable_latency_ms = 45000       # EWMA ceiling for a "stable" success
# decrease_ratio = 0.5            # max_parallel multiplier on failure
# ewma_alpha = 0.3                # weight of the newest latency sample
# rate_limit_cooldown_secs = 180
# timeout_cooldown_secs = 120
# default_cooldown_secs = 60

# [providers.codex]
# initial_parallel = 3
# min_parallel = 2
# initial_cap = 4
# hard_limit = 12
# growth_threshold = 12
#
# [providers.gemini]
# initial_parallel = 1
# min_parallel = 1
# initial_cap = 2
# hard_limit = 6
# growth_threshold = 10

[cache]
# codex_rate_limits_stale_secs = 15
# gemini_quota_stale_secs = 300
# gemini_session_stale_secs = 15
# fetch_timeout_ms = 3000

[gemini]
# rpm_limit = 60
# fallback_model = "gemini-3-flash-preview"
"#
        .to_string()
    }

    /// Write the commented template, refusing to clobber an existing file.
    pub fn save_default_template() -> Result<PathBuf> {
        let path = paths::config_path().context("Failed to determine config directory")?;
        if path.exists() {
            anyhow::bail!("Config already exists: {}", path.display());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&path, Self::default_template())
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
#[path = "global_tests.rs"]
mod tests;
