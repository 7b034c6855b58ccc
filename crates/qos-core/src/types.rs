use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AppError;

/// Account id used when a tool invocation names no account.
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Rate-limited CLI backend whose concurrency is tracked.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Codex,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Codex, Provider::Gemini];

    /// Key used in the profile file and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }

    /// Single-letter row marker in the status view.
    pub fn marker(&self) -> char {
        match self {
            Self::Codex => 'x',
            Self::Gemini => 'g',
        }
    }

    /// Account label shown when no account has been configured or selected.
    pub fn fallback_account_id(&self) -> String {
        format!("{}-main", self.as_str())
    }

    /// Built-in throttling policy. Overridable per provider from `config.toml`.
    pub fn default_policy(&self) -> ProviderPolicy {
        match self {
            Self::Codex => ProviderPolicy {
                initial_parallel: 3,
                min_parallel: 2,
                initial_cap: 4,
                hard_limit: 12,
                growth_threshold: 12,
            },
            Self::Gemini => ProviderPolicy {
                initial_parallel: 1,
                min_parallel: 1,
                initial_cap: 2,
                hard_limit: 6,
                growth_threshold: 10,
            },
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "codex" => Ok(Self::Codex),
            "gemini" => Ok(Self::Gemini),
            _ => Err(AppError::UnknownProvider(s.to_string())),
        }
    }
}

/// Per-provider concurrency policy.
///
/// `initial_*` seed a freshly created account; `min_parallel` is the floor
/// backoff never crosses; `hard_limit` bounds how far the ceiling itself
/// may grow; `growth_threshold` is the number of consecutive stable
/// successes needed to raise the ceiling by one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPolicy {
    pub initial_parallel: u32,
    pub min_parallel: u32,
    pub initial_cap: u32,
    pub hard_limit: u32,
    pub growth_threshold: u32,
}

impl ProviderPolicy {
    /// Repair a policy assembled from user overrides so that
    /// `1 <= min <= initial <= cap <= hard` holds.
    pub fn sanitized(mut self) -> Self {
        self.min_parallel = self.min_parallel.max(1);
        self.hard_limit = self.hard_limit.max(self.min_parallel);
        self.initial_cap = self.initial_cap.clamp(self.min_parallel, self.hard_limit);
        self.initial_parallel = self
            .initial_parallel
            .clamp(self.min_parallel, self.initial_cap);
        self.growth_threshold = self.growth_threshold.max(1);
        self
    }
}

/// Resolved policy for every provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyTable(BTreeMap<Provider, ProviderPolicy>);

impl PolicyTable {
    pub fn builtin() -> Self {
        Self(
            Provider::ALL
                .iter()
                .map(|p| (*p, p.default_policy()))
                .collect(),
        )
    }

    pub fn with(mut self, provider: Provider, policy: ProviderPolicy) -> Self {
        self.0.insert(provider, policy.sanitized());
        self
    }

    pub fn get(&self, provider: Provider) -> ProviderPolicy {
        self.0
            .get(&provider)
            .copied()
            .unwrap_or_else(|| provider.default_policy())
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Classified cause of a failed tool invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimit,
    Timeout,
    Auth,
    Default,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Externally fetched snapshot kept in its own cache file.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum CacheSource {
    /// Codex 5h/weekly windows harvested from session logs.
    CodexRateLimits,
    /// Gemini daily quota buckets from the Code Assist API.
    GeminiQuota,
    /// Gemini token usage of the most recent chat session.
    GeminiSession,
}

impl CacheSource {
    pub const ALL: [CacheSource; 3] = [
        CacheSource::CodexRateLimits,
        CacheSource::GeminiQuota,
        CacheSource::GeminiSession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodexRateLimits => "codex-rate-limits",
            Self::GeminiQuota => "gemini-quota",
            Self::GeminiSession => "gemini-session",
        }
    }

    /// Whether entries are bound to an (account, credential) cache key.
    pub fn is_account_bound(&self) -> bool {
        matches!(self, Self::GeminiQuota)
    }
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CacheSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|source| source.as_str() == s)
            .copied()
            .ok_or_else(|| AppError::UnknownCacheSource(s.to_string()))
    }
}

/// Check an account id against the characters accepted in hook commands.
pub fn validate_account_id(id: &str) -> Result<String, AppError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '-'));
    if valid {
        Ok(id.to_string())
    } else {
        Err(AppError::InvalidAccountId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trips_through_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>(), Ok(provider));
        }
        assert_eq!("  Gemini ".parse::<Provider>(), Ok(Provider::Gemini));
    }

    #[test]
    fn test_provider_unknown() {
        assert_eq!(
            "claude".parse::<Provider>(),
            Err(AppError::UnknownProvider("claude".into()))
        );
    }

    #[test]
    fn test_provider_serializes_lowercase() {
        let json = serde_json::to_string(&Provider::Codex).unwrap();
        assert_eq!(json, "\"codex\"");
    }

    #[test]
    fn test_default_policies_match_known_constants() {
        let codex = Provider::Codex.default_policy();
        assert_eq!(
            (codex.initial_parallel, codex.min_parallel, codex.initial_cap),
            (3, 2, 4)
        );
        assert_eq!((codex.hard_limit, codex.growth_threshold), (12, 12));

        let gemini = Provider::Gemini.default_policy();
        assert_eq!(
            (gemini.initial_parallel, gemini.min_parallel, gemini.initial_cap),
            (1, 1, 2)
        );
        assert_eq!((gemini.hard_limit, gemini.growth_threshold), (6, 10));
    }

    #[test]
    fn test_sanitized_repairs_inverted_bounds() {
        let policy = ProviderPolicy {
            initial_parallel: 9,
            min_parallel: 0,
            initial_cap: 20,
            hard_limit: 5,
            growth_threshold: 0,
        }
        .sanitized();
        assert_eq!(policy.min_parallel, 1);
        assert_eq!(policy.hard_limit, 5);
        assert_eq!(policy.initial_cap, 5);
        assert_eq!(policy.initial_parallel, 5);
        assert_eq!(policy.growth_threshold, 1);
    }

    #[test]
    fn test_policy_table_override() {
        let custom = ProviderPolicy {
            hard_limit: 8,
            ..Provider::Gemini.default_policy()
        };
        let table = PolicyTable::builtin().with(Provider::Gemini, custom);
        assert_eq!(table.get(Provider::Gemini).hard_limit, 8);
        assert_eq!(table.get(Provider::Codex), Provider::Codex.default_policy());
    }

    #[test]
    fn test_cache_source_names() {
        assert_eq!(
            "gemini-quota".parse::<CacheSource>(),
            Ok(CacheSource::GeminiQuota)
        );
        assert!("gemini".parse::<CacheSource>().is_err());
        assert!(CacheSource::GeminiQuota.is_account_bound());
        assert!(!CacheSource::CodexRateLimits.is_account_bound());
        assert!(!CacheSource::GeminiSession.is_account_bound());
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::RateLimit).unwrap();
        assert_eq!(json, "\"rate_limit\"");
    }

    #[test]
    fn test_validate_account_id() {
        assert_eq!(validate_account_id("alice@corp.io").unwrap(), "alice@corp.io");
        assert!(validate_account_id("").is_err());
        assert!(validate_account_id("a;rm").is_err());
    }
}
