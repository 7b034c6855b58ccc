use qos_core::Provider;
use qos_state::ProviderProfile;

/// `[QOS-HUD] codex account=alice par=2/4 ewma=812ms 429=1 to=0`
///
/// Without an account id (or for an account never seen) the mirrored
/// provider-level state is shown.
pub fn render_hint(provider: Provider, profile: &ProviderProfile, account_id: Option<&str>) -> String {
    let (label, state) = profile.view(account_id);
    format!(
        "[QOS-HUD] {provider} account={label} par={}/{} ewma={}ms 429={} to={}",
        state.max_parallel,
        state.max_parallel_cap,
        state.ewma_latency_ms,
        state.recent_429,
        state.recent_timeout
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_for_fresh_provider() {
        let profile = ProviderProfile::seeded(Provider::Gemini.default_policy());
        assert_eq!(
            render_hint(Provider::Gemini, &profile, None),
            "[QOS-HUD] gemini account=default par=1/2 ewma=0ms 429=0 to=0"
        );
    }

    #[test]
    fn test_hint_for_named_account() {
        let policy = Provider::Codex.default_policy();
        let mut profile = ProviderProfile::seeded(policy);
        let alice = profile.ensure_account("alice", policy);
        alice.max_parallel = 2;
        alice.ewma_latency_ms = 812;
        alice.recent_429 = 1;

        assert_eq!(
            render_hint(Provider::Codex, &profile, Some("alice")),
            "[QOS-HUD] codex account=alice par=2/4 ewma=812ms 429=1 to=0"
        );
    }

    #[test]
    fn test_hint_without_account_uses_last_account_label() {
        let policy = Provider::Codex.default_policy();
        let mut profile = ProviderProfile::seeded(policy);
        profile.ensure_account("work", policy);
        assert!(render_hint(Provider::Codex, &profile, None).contains("account=work par=3/4"));
    }
}
