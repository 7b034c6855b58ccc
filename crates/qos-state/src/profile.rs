//! On-disk shape of the concurrency profile (`cli_qos_profile.json`).

use chrono::{DateTime, Utc};
use qos_core::lenient;
use qos_core::{DEFAULT_ACCOUNT_ID, PolicyTable, Provider, ProviderPolicy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const PROFILE_VERSION: u32 = 1;

/// Throttling state of one (provider, account) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    #[serde(default, deserialize_with = "lenient::count")]
    pub max_parallel: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub min_parallel: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub max_parallel_cap: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub success_streak: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub cap_growth_streak: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub recent_429: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub recent_timeout: u32,
    #[serde(default, deserialize_with = "lenient::millis")]
    pub ewma_latency_ms: u64,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub cooldown_until: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Fields written by other tools or newer releases, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccountState {
    /// Fresh state seeded from the provider policy.
    pub fn seeded(policy: ProviderPolicy) -> Self {
        Self {
            max_parallel: policy.initial_parallel,
            min_parallel: policy.min_parallel,
            max_parallel_cap: policy.initial_cap,
            success_streak: 0,
            cap_growth_streak: 0,
            recent_429: 0,
            recent_timeout: 0,
            ewma_latency_ms: 0,
            cooldown_until: None,
            last_success_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// Restore `1 <= min <= max <= cap <= hard`.
    ///
    /// Zero bounds (missing or garbage in storage) are reseeded from the
    /// policy before clamping.
    pub fn repair(&mut self, policy: ProviderPolicy) {
        if self.min_parallel == 0 {
            self.min_parallel = policy.min_parallel;
        }
        if self.max_parallel_cap == 0 {
            self.max_parallel_cap = policy.initial_cap;
        }
        if self.max_parallel == 0 {
            self.max_parallel = policy.initial_parallel;
        }
        self.min_parallel = self.min_parallel.clamp(1, policy.hard_limit.max(1));
        let hard = policy.hard_limit.max(self.min_parallel);
        self.max_parallel_cap = self.max_parallel_cap.clamp(self.min_parallel, hard);
        self.max_parallel = self
            .max_parallel
            .clamp(self.min_parallel, self.max_parallel_cap);
    }

    /// Whether a backoff window is still open at `now`.
    pub fn cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    /// Seconds left in the backoff window, rounded up.
    pub fn cooldown_remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        match self.cooldown_until {
            Some(until) if until > now => {
                let ms = (until - now).num_milliseconds().max(0) as u64;
                ms.div_ceil(1000)
            }
            _ => 0,
        }
    }

    fn copy_counters_from(&mut self, other: &AccountState) {
        self.max_parallel = other.max_parallel;
        self.min_parallel = other.min_parallel;
        self.max_parallel_cap = other.max_parallel_cap;
        self.success_streak = other.success_streak;
        self.cap_growth_streak = other.cap_growth_streak;
        self.recent_429 = other.recent_429;
        self.recent_timeout = other.recent_timeout;
        self.ewma_latency_ms = other.ewma_latency_ms;
        self.cooldown_until = other.cooldown_until;
        self.last_success_at = other.last_success_at;
    }
}

/// All accounts of one provider.
///
/// The flattened `current` block mirrors the most recently touched account
/// for readers that predate per-account tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    #[serde(flatten)]
    pub current: AccountState,
    #[serde(default, deserialize_with = "lenient::text")]
    pub last_account_id: String,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountState>,
}

impl ProviderProfile {
    pub fn seeded(policy: ProviderPolicy) -> Self {
        Self {
            current: AccountState::seeded(policy),
            last_account_id: String::new(),
            accounts: BTreeMap::new(),
        }
    }

    pub fn account(&self, account_id: &str) -> Option<&AccountState> {
        self.accounts.get(account_id)
    }

    /// Get or lazily create the account, and remember it as the last one used.
    ///
    /// New accounts are seeded from `policy`, not from the mirrored block,
    /// so one account's backoff never leaks into another.
    pub fn ensure_account(&mut self, account_id: &str, policy: ProviderPolicy) -> &mut AccountState {
        let id = if account_id.is_empty() {
            DEFAULT_ACCOUNT_ID
        } else {
            account_id
        };
        self.last_account_id = id.to_string();
        self.accounts
            .entry(id.to_string())
            .or_insert_with(|| AccountState::seeded(policy))
    }

    /// Copy an account's counters into the mirrored block.
    pub fn mirror(&mut self, account_id: &str, now: DateTime<Utc>) {
        if let Some(account) = self.accounts.get(account_id) {
            let snapshot = account.clone();
            self.current.copy_counters_from(&snapshot);
            self.current.updated_at = Some(now);
        }
    }

    /// State to display for `account_id`, falling back to the mirrored block.
    ///
    /// Returns the label to show alongside it.
    pub fn view<'a>(&'a self, account_id: Option<&'a str>) -> (&'a str, &'a AccountState) {
        if let Some(id) = account_id.filter(|id| !id.is_empty()) {
            return match self.accounts.get(id) {
                Some(state) => (id, state),
                None => (id, &self.current),
            };
        }
        let label = if self.last_account_id.is_empty() {
            DEFAULT_ACCOUNT_ID
        } else {
            self.last_account_id.as_str()
        };
        (label, &self.current)
    }
}

/// Every known provider is always present; unknown provider keys found on
/// disk are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSet {
    pub codex: ProviderProfile,
    pub gemini: ProviderProfile,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub version: u32,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    pub providers: ProviderSet,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Profile {
    /// Profile with every provider at its policy defaults.
    pub fn seeded(policies: &PolicyTable) -> Self {
        Self {
            version: PROFILE_VERSION,
            updated_at: None,
            providers: ProviderSet {
                codex: ProviderProfile::seeded(policies.get(Provider::Codex)),
                gemini: ProviderProfile::seeded(policies.get(Provider::Gemini)),
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    pub fn provider(&self, provider: Provider) -> &ProviderProfile {
        match provider {
            Provider::Codex => &self.providers.codex,
            Provider::Gemini => &self.providers.gemini,
        }
    }

    pub fn provider_mut(&mut self, provider: Provider) -> &mut ProviderProfile {
        match provider {
            Provider::Codex => &mut self.providers.codex,
            Provider::Gemini => &mut self.providers.gemini,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn codex() -> ProviderPolicy {
        Provider::Codex.default_policy()
    }

    #[test]
    fn test_seeded_account_matches_policy() {
        let state = AccountState::seeded(codex());
        assert_eq!(
            (state.max_parallel, state.min_parallel, state.max_parallel_cap),
            (3, 2, 4)
        );
        assert!(state.cooldown_until.is_none());
    }

    #[test]
    fn test_repair_restores_bounds() {
        let mut state = AccountState::seeded(codex());
        state.max_parallel = 40;
        state.max_parallel_cap = 30;
        state.repair(codex());
        assert_eq!(state.max_parallel_cap, 12);
        assert_eq!(state.max_parallel, 12);

        state.min_parallel = 0;
        state.max_parallel = 0;
        state.max_parallel_cap = 1;
        state.repair(codex());
        assert_eq!(state.min_parallel, 2);
        assert_eq!(state.max_parallel_cap, 2);
        assert_eq!(state.max_parallel, 2);
    }

    #[test]
    fn test_ensure_account_seeds_from_policy_not_mirror() {
        let mut profile = ProviderProfile::seeded(codex());
        profile.current.max_parallel = 2;
        profile.current.recent_429 = 5;

        let bob = profile.ensure_account("bob", codex());
        assert_eq!(bob.max_parallel, 3);
        assert_eq!(bob.recent_429, 0);
        assert_eq!(profile.last_account_id, "bob");
    }

    #[test]
    fn test_ensure_account_empty_id_is_default() {
        let mut profile = ProviderProfile::seeded(codex());
        profile.ensure_account("", codex());
        assert!(profile.accounts.contains_key("default"));
        assert_eq!(profile.last_account_id, "default");
    }

    #[test]
    fn test_mirror_keeps_extra_fields() {
        let mut profile = ProviderProfile::seeded(codex());
        profile
            .current
            .extra
            .insert("note".into(), Value::String("keep".into()));
        profile.ensure_account("alice", codex()).recent_timeout = 2;
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        profile.mirror("alice", now);

        assert_eq!(profile.current.recent_timeout, 2);
        assert_eq!(profile.current.updated_at, Some(now));
        assert_eq!(profile.current.extra["note"], "keep");
    }

    #[test]
    fn test_view_falls_back_to_mirror() {
        let mut profile = ProviderProfile::seeded(codex());
        profile.ensure_account("alice", codex()).max_parallel = 4;

        let (label, state) = profile.view(Some("alice"));
        assert_eq!((label, state.max_parallel), ("alice", 4));

        let (label, state) = profile.view(Some("nobody"));
        assert_eq!((label, state.max_parallel), ("nobody", 3));

        let (label, _) = profile.view(None);
        assert_eq!(label, "alice");
    }

    #[test]
    fn test_cooldown_remaining_rounds_up() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut state = AccountState::seeded(codex());
        assert_eq!(state.cooldown_remaining_secs(now), 0);

        state.cooldown_until = Some(now + chrono::Duration::milliseconds(1500));
        assert!(state.cooling_down(now));
        assert_eq!(state.cooldown_remaining_secs(now), 2);

        state.cooldown_until = Some(now - chrono::Duration::seconds(1));
        assert!(!state.cooling_down(now));
        assert_eq!(state.cooldown_remaining_secs(now), 0);
    }
}
