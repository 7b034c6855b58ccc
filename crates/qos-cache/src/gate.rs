//! Stale-while-revalidate decision for one cached snapshot.
//!
//! The gate never blocks on the network: it always answers with whatever
//! usable payload is on disk and separately says whether a background
//! refresh should be started.

use std::time::Duration;

use crate::entry::CacheEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheReason {
    /// Nothing on disk.
    Missing,
    /// Caller asked to bypass freshness.
    Forced,
    /// Entry predates cache keys; served once while a refresh replaces it.
    Legacy,
    /// Entry belongs to another account or credential; never served.
    ForeignKey,
    Fresh,
    Stale,
}

impl CacheReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Forced => "forced",
            Self::Legacy => "legacy",
            Self::ForeignKey => "foreign-key",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheDecision<T> {
    pub payload: Option<T>,
    pub should_refresh: bool,
    pub reason: CacheReason,
}

impl<T> CacheDecision<T> {
    fn new(payload: Option<T>, should_refresh: bool, reason: CacheReason) -> Self {
        Self {
            payload,
            should_refresh,
            reason,
        }
    }
}

/// Decide what to serve from `entry` and whether to refresh it.
///
/// `requested_key` is `None` for sources that are not account-bound; any
/// entry then matches. An entry without a usable timestamp counts as stale.
pub fn evaluate<T>(
    entry: Option<CacheEntry<T>>,
    requested_key: Option<&str>,
    stale_budget: Duration,
    force_refresh: bool,
    now_ms: i64,
) -> CacheDecision<T> {
    let Some(entry) = entry else {
        return CacheDecision::new(None, true, CacheReason::Missing);
    };

    let key_state = match (requested_key, entry.cache_key.as_deref()) {
        (None, _) => KeyState::Match,
        (Some(_), None) => KeyState::Legacy,
        (Some(wanted), Some(found)) if wanted == found => KeyState::Match,
        (Some(_), Some(_)) => KeyState::Foreign,
    };

    if key_state == KeyState::Foreign {
        return CacheDecision::new(None, true, CacheReason::ForeignKey);
    }
    if force_refresh {
        return CacheDecision::new(Some(entry.payload), true, CacheReason::Forced);
    }
    if key_state == KeyState::Legacy {
        return CacheDecision::new(Some(entry.payload), true, CacheReason::Legacy);
    }

    let budget_ms = i64::try_from(stale_budget.as_millis()).unwrap_or(i64::MAX);
    let stale = entry.age_ms(now_ms).is_none_or(|age| age >= budget_ms);
    let reason = if stale {
        CacheReason::Stale
    } else {
        CacheReason::Fresh
    };
    CacheDecision::new(Some(entry.payload), stale, reason)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Match,
    Legacy,
    Foreign,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_secs(300);
    const NOW: i64 = 1_800_000_000_000;

    fn entry(age_ms: i64, key: Option<&str>) -> Option<CacheEntry<&'static str>> {
        Some(CacheEntry::new(NOW - age_ms, key.map(String::from), "snapshot"))
    }

    #[test]
    fn test_missing_entry_requests_refresh() {
        let decision = evaluate::<u8>(None, Some("a::f"), BUDGET, false, NOW);
        assert_eq!(decision.payload, None);
        assert!(decision.should_refresh);
        assert_eq!(decision.reason, CacheReason::Missing);
    }

    #[test]
    fn test_fresh_matching_entry_is_served_without_refresh() {
        let decision = evaluate(entry(1_000, Some("a::f")), Some("a::f"), BUDGET, false, NOW);
        assert_eq!(decision.payload, Some("snapshot"));
        assert!(!decision.should_refresh);
        assert_eq!(decision.reason, CacheReason::Fresh);
    }

    #[test]
    fn test_stale_entry_is_still_served() {
        let decision = evaluate(entry(300_000, Some("a::f")), Some("a::f"), BUDGET, false, NOW);
        assert_eq!(decision.payload, Some("snapshot"));
        assert!(decision.should_refresh);
        assert_eq!(decision.reason, CacheReason::Stale);
    }

    #[test]
    fn test_foreign_key_is_never_served() {
        let decision = evaluate(entry(10, Some("bob::f")), Some("alice::f"), BUDGET, false, NOW);
        assert_eq!(decision.payload, None);
        assert!(decision.should_refresh);
        assert_eq!(decision.reason, CacheReason::ForeignKey);
    }

    #[test]
    fn test_rotated_credential_is_foreign() {
        let decision = evaluate(entry(10, Some("alice::old")), Some("alice::new"), BUDGET, false, NOW);
        assert_eq!(decision.payload, None);
    }

    #[test]
    fn test_legacy_entry_served_once_with_refresh() {
        let decision = evaluate(entry(10, None), Some("alice::f"), BUDGET, false, NOW);
        assert_eq!(decision.payload, Some("snapshot"));
        assert!(decision.should_refresh);
        assert_eq!(decision.reason, CacheReason::Legacy);
    }

    #[test]
    fn test_force_keeps_fallback_payload() {
        let decision = evaluate(entry(10, Some("a::f")), Some("a::f"), BUDGET, true, NOW);
        assert_eq!(decision.payload, Some("snapshot"));
        assert!(decision.should_refresh);
        assert_eq!(decision.reason, CacheReason::Forced);
    }

    #[test]
    fn test_force_never_falls_back_to_foreign_entry() {
        let decision = evaluate(entry(10, Some("b::f")), Some("a::f"), BUDGET, true, NOW);
        assert_eq!(decision.payload, None);
    }

    #[test]
    fn test_unbound_source_accepts_any_entry() {
        let decision = evaluate(entry(5_000, Some("whatever")), None, Duration::from_secs(15), false, NOW);
        assert!(!decision.should_refresh);
        let decision = evaluate(entry(15_000, None), None, Duration::from_secs(15), false, NOW);
        assert!(decision.should_refresh);
        assert_eq!(decision.payload, Some("snapshot"));
    }

    #[test]
    fn test_unknown_timestamp_is_stale() {
        let entry = CacheEntry {
            timestamp: None,
            cache_key: None,
            payload: 1_u8,
        };
        let decision = evaluate(Some(entry), None, BUDGET, false, NOW);
        assert_eq!(decision.payload, Some(1));
        assert!(decision.should_refresh);
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let decision = evaluate(entry(-5_000, None), None, BUDGET, false, NOW);
        assert!(!decision.should_refresh);
    }
}
