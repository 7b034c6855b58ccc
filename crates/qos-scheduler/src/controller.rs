//! Adaptive (AIMD) concurrency control per provider account.
//!
//! A failure halves `max_parallel` at once. Recovery is additive and gated
//! on sustained health: every `success_streak_step_up` clean successes move
//! `max_parallel` one step toward `max_parallel_cap`, and only a much longer
//! run of stable successes (`growth_threshold`) raises the cap itself,
//! bounded by the provider's hard limit.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use qos_config::PolicyConfig;
use qos_core::{FailureKind, Provider, ProviderPolicy};
use qos_state::{AccountState, ProfileStore};

use crate::classify::classify;
use crate::hint::render_hint;

const MAX_COOLDOWN_SECS: u64 = 86_400;

/// What a success event changed, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuccessOutcome {
    pub parallel_raised: bool,
    pub cap_raised: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub kind: FailureKind,
    pub cooldown_until: DateTime<Utc>,
}

/// Apply one successful call of `latency_ms` to `state`.
pub fn apply_success(
    state: &mut AccountState,
    latency_ms: f64,
    now: DateTime<Utc>,
    policy: ProviderPolicy,
    tunables: &PolicyConfig,
) -> SuccessOutcome {
    let mut outcome = SuccessOutcome::default();
    // Must be read before the counters are cleared below.
    let had_recent_errors = state.recent_429 > 0 || state.recent_timeout > 0;

    if latency_ms.is_finite() && latency_ms > 0.0 {
        state.ewma_latency_ms = if state.ewma_latency_ms > 0 {
            let alpha = tunables.effective_ewma_alpha();
            (alpha * latency_ms + (1.0 - alpha) * state.ewma_latency_ms as f64).round() as u64
        } else {
            latency_ms.round() as u64
        };
    }

    state.success_streak = state.success_streak.saturating_add(1);
    let latency_ok = state.ewma_latency_ms <= tunables.stable_latency_ms;
    state.cap_growth_streak = if !had_recent_errors && latency_ok {
        state.cap_growth_streak.saturating_add(1)
    } else {
        0
    };
    state.recent_429 = 0;
    state.recent_timeout = 0;
    state.cooldown_until = None;
    state.last_success_at = Some(now);

    if state.success_streak >= tunables.effective_step_up() && latency_ok {
        let raised = state
            .max_parallel
            .saturating_add(1)
            .min(state.max_parallel_cap);
        outcome.parallel_raised = raised > state.max_parallel;
        state.max_parallel = raised;
        state.success_streak = 0;
    }

    let hard_limit = policy.hard_limit.max(state.min_parallel);
    state.max_parallel_cap = state.max_parallel_cap.min(hard_limit);
    if state.cap_growth_streak >= policy.growth_threshold.max(1)
        && state.max_parallel_cap < hard_limit
    {
        state.max_parallel_cap += 1;
        state.cap_growth_streak = 0;
        outcome.cap_raised = true;
    }
    state.max_parallel = state.max_parallel.min(state.max_parallel_cap);
    state.updated_at = Some(now);
    outcome
}

/// Apply one failed call to `state`: multiplicative backoff plus a cooldown
/// whose length depends on the classified failure.
pub fn apply_failure(
    state: &mut AccountState,
    error_text: &str,
    now: DateTime<Utc>,
    tunables: &PolicyConfig,
) -> FailureOutcome {
    let kind = classify(error_text);
    let reduced = (f64::from(state.max_parallel) * tunables.effective_decrease_ratio()).floor() as u32;
    state.max_parallel = reduced.max(state.min_parallel);
    state.success_streak = 0;
    state.cap_growth_streak = 0;
    match kind {
        FailureKind::RateLimit => state.recent_429 = state.recent_429.saturating_add(1),
        FailureKind::Timeout => state.recent_timeout = state.recent_timeout.saturating_add(1),
        FailureKind::Auth | FailureKind::Default => {}
    }

    let cooldown_secs = tunables.cooldown_secs(kind).clamp(1, MAX_COOLDOWN_SECS) as i64;
    let cooldown_until = now
        .checked_add_signed(Duration::seconds(cooldown_secs))
        .unwrap_or(now);
    state.cooldown_until = Some(cooldown_until);
    state.updated_at = Some(now);
    FailureOutcome {
        kind,
        cooldown_until,
    }
}

/// Store-backed controller: each event is one locked read-modify-write of
/// the profile file.
#[derive(Debug, Clone)]
pub struct ConcurrencyController {
    store: ProfileStore,
    tunables: PolicyConfig,
}

impl ConcurrencyController {
    pub fn new(store: ProfileStore, tunables: PolicyConfig) -> Self {
        Self { store, tunables }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn on_success(&self, provider: Provider, account_id: &str, latency_ms: f64) -> Result<AccountState> {
        self.on_success_at(provider, account_id, latency_ms, Utc::now())
    }

    pub fn on_success_at(
        &self,
        provider: Provider,
        account_id: &str,
        latency_ms: f64,
        now: DateTime<Utc>,
    ) -> Result<AccountState> {
        let policy = self.store.policies().get(provider);
        let (state, outcome) = self.store.transact(|profile| {
            let entry = profile.provider_mut(provider);
            let account = entry.ensure_account(account_id, policy);
            let outcome = apply_success(account, latency_ms, now, policy, &self.tunables);
            let state = account.clone();
            let id = entry.last_account_id.clone();
            entry.mirror(&id, now);
            (state, outcome)
        })?;

        if outcome.parallel_raised {
            tracing::info!(
                provider = %provider,
                account = %account_id,
                max_parallel = state.max_parallel,
                "Raised parallelism after stable successes"
            );
        }
        if outcome.cap_raised {
            tracing::info!(
                provider = %provider,
                account = %account_id,
                max_parallel_cap = state.max_parallel_cap,
                "Raised parallelism ceiling"
            );
        }
        Ok(state)
    }

    pub fn on_failure(&self, provider: Provider, account_id: &str, error_text: &str) -> Result<AccountState> {
        self.on_failure_at(provider, account_id, error_text, Utc::now())
    }

    pub fn on_failure_at(
        &self,
        provider: Provider,
        account_id: &str,
        error_text: &str,
        now: DateTime<Utc>,
    ) -> Result<AccountState> {
        let policy = self.store.policies().get(provider);
        let (state, outcome) = self.store.transact(|profile| {
            let entry = profile.provider_mut(provider);
            let account = entry.ensure_account(account_id, policy);
            let outcome = apply_failure(account, error_text, now, &self.tunables);
            let state = account.clone();
            let id = entry.last_account_id.clone();
            entry.mirror(&id, now);
            (state, outcome)
        })?;

        tracing::info!(
            provider = %provider,
            account = %account_id,
            kind = %outcome.kind,
            max_parallel = state.max_parallel,
            cooldown_until = %outcome.cooldown_until,
            "Backoff applied"
        );
        Ok(state)
    }

    /// One-line summary of the account's current limits.
    pub fn hint(&self, provider: Provider, account_id: Option<&str>) -> String {
        let profile = self.store.load();
        render_hint(provider, profile.provider(provider), account_id)
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
