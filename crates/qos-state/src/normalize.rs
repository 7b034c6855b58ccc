//! Turn whatever is on disk into a well-formed [`Profile`].
//!
//! Raw provider objects are shallow-merged over the provider defaults, so
//! fields a newer or older writer added survive a rewrite. Normalization is
//! a pure function of its input: it never stamps the current time, which
//! keeps repeated reads byte-identical.

use qos_core::{PolicyTable, Provider, ProviderPolicy};
use serde_json::{Map, Value};

use crate::profile::{AccountState, PROFILE_VERSION, Profile, ProviderProfile};

const RESERVED_TOP_LEVEL: [&str; 3] = ["version", "updated_at", "providers"];

pub fn normalize(raw: Option<&Value>, policies: &PolicyTable) -> Profile {
    let source = raw.and_then(Value::as_object);
    let raw_providers = source
        .and_then(|obj| obj.get("providers"))
        .and_then(Value::as_object);

    let mut profile = Profile::seeded(policies);
    for provider in Provider::ALL {
        let raw_provider = raw_providers.and_then(|p| p.get(provider.as_str()));
        *profile.provider_mut(provider) = normalize_provider(raw_provider, policies.get(provider));
    }

    if let Some(raw_providers) = raw_providers {
        for (key, value) in raw_providers {
            if key.parse::<Provider>().is_err() {
                profile.providers.extra.insert(key.clone(), value.clone());
            }
        }
    }

    if let Some(obj) = source {
        profile.updated_at = obj
            .get("updated_at")
            .and_then(qos_core::lenient::value_to_datetime);
        for (key, value) in obj {
            if !RESERVED_TOP_LEVEL.contains(&key.as_str()) {
                profile.extra.insert(key.clone(), value.clone());
            }
        }
    }
    profile.version = PROFILE_VERSION;
    profile
}

fn normalize_provider(raw: Option<&Value>, policy: ProviderPolicy) -> ProviderProfile {
    let raw = raw.and_then(Value::as_object);
    let mut merged = match serde_json::to_value(ProviderProfile::seeded(policy)) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    if let Some(raw) = raw {
        for (key, value) in raw {
            if key != "accounts" {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    let mut profile: ProviderProfile = serde_json::from_value(Value::Object(merged))
        .unwrap_or_else(|error| {
            tracing::warn!(%error, "Discarding undecodable provider state");
            ProviderProfile::seeded(policy)
        });
    profile.current.repair(policy);

    let raw_accounts = raw
        .and_then(|r| r.get("accounts"))
        .and_then(Value::as_object);
    if let Some(raw_accounts) = raw_accounts {
        for (id, value) in raw_accounts {
            if let Some(account) = normalize_account(value, policy) {
                profile.accounts.insert(id.clone(), account);
            }
        }
    }
    profile
}

/// Non-object entries are dropped; objects are merged over a seeded account.
fn normalize_account(raw: &Value, policy: ProviderPolicy) -> Option<AccountState> {
    let raw = raw.as_object()?;
    let mut merged = match serde_json::to_value(AccountState::seeded(policy)) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (key, value) in raw {
        merged.insert(key.clone(), value.clone());
    }
    let mut account: AccountState = serde_json::from_value(Value::Object(merged)).ok()?;
    account.repair(policy);
    Some(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> PolicyTable {
        PolicyTable::builtin()
    }

    #[test]
    fn test_missing_input_yields_defaults() {
        let profile = normalize(None, &table());
        assert_eq!(profile, Profile::seeded(&table()));
        assert_eq!(profile.providers.codex.current.max_parallel, 3);
        assert_eq!(profile.providers.gemini.current.max_parallel_cap, 2);
    }

    #[test]
    fn test_non_object_input_yields_defaults() {
        for raw in [json!(null), json!([1, 2]), json!("x"), json!({"providers": 7})] {
            assert_eq!(normalize(Some(&raw), &table()), Profile::seeded(&table()));
        }
    }

    #[test]
    fn test_missing_provider_is_filled_in() {
        let raw = json!({"providers": {"codex": {"max_parallel": 4}}});
        let profile = normalize(Some(&raw), &table());
        assert_eq!(profile.providers.codex.current.max_parallel, 4);
        assert_eq!(profile.providers.codex.current.min_parallel, 2);
        assert_eq!(
            profile.providers.gemini,
            ProviderProfile::seeded(Provider::Gemini.default_policy())
        );
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let raw = json!({
            "version": 1,
            "schema_note": "hand-edited",
            "providers": {
                "codex": {"custom_flag": true, "accounts": {"a": {"tag": "x"}}},
                "opencode": {"max_parallel": 9}
            }
        });
        let profile = normalize(Some(&raw), &table());
        assert_eq!(profile.extra["schema_note"], "hand-edited");
        assert_eq!(profile.providers.codex.current.extra["custom_flag"], true);
        assert_eq!(profile.providers.codex.accounts["a"].extra["tag"], "x");
        assert_eq!(profile.providers.extra["opencode"]["max_parallel"], 9);
    }

    #[test]
    fn test_garbage_values_degrade_and_are_repaired() {
        let raw = json!({"providers": {"gemini": {
            "max_parallel": "lots",
            "max_parallel_cap": 99,
            "recent_429": "3",
            "cooldown_until": {"bad": 1},
            "accounts": {"ok": {"max_parallel": 2}, "broken": 17}
        }}});
        let gemini = normalize(Some(&raw), &table()).providers.gemini;
        assert_eq!(gemini.current.max_parallel, 1);
        assert_eq!(gemini.current.max_parallel_cap, 6);
        assert_eq!(gemini.current.recent_429, 3);
        assert!(gemini.current.cooldown_until.is_none());
        assert_eq!(gemini.accounts["ok"].max_parallel, 2);
        assert!(!gemini.accounts.contains_key("broken"));
    }

    #[test]
    fn test_providers_do_not_share_state() {
        let mut profile = normalize(None, &table());
        profile.providers.codex.current.recent_429 = 4;
        profile
            .providers
            .codex
            .ensure_account("x", Provider::Codex.default_policy());
        assert_eq!(profile.providers.gemini.current.recent_429, 0);
        assert!(profile.providers.gemini.accounts.is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = json!({
            "updated_at": "2026-02-01T00:00:00Z",
            "providers": {"codex": {"max_parallel": 5, "max_parallel_cap": 6,
                "accounts": {"alice": {"recent_429": 2, "cooldown_until": "2026-02-01T00:03:00Z"}}}}
        });
        let first = serde_json::to_string_pretty(&normalize(Some(&raw), &table())).unwrap();
        let reparsed: Value = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string_pretty(&normalize(Some(&reparsed), &table())).unwrap();
        assert_eq!(first, second);
    }
}
