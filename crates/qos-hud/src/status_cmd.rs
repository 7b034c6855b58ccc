//! `qos-hud status`: one plain-text row per provider.
//!
//! Snapshots are served stale-while-revalidate: whatever is cached is shown
//! at once and stale sources get a background refresh. Missing data shows
//! as neutral values.

use anyhow::Result;
use chrono::{DateTime, Utc};
use qos_cache::{RefreshRequest, serve_and_revalidate};
use qos_config::paths;
use qos_core::lenient::value_to_u64;
use qos_core::{CacheSource, Provider};
use qos_sources::{
    ClaudeTokenStats, ClaudeUsage, CodexRateLimits, GeminiQuota, GeminiSessionTokens,
    QuotaBucket, RpmUsage, WindowEstimate, clamp_percent, format_duration, read_codex_email,
};
use qos_state::{AccountState, Profile};
use serde_json::Value;
use std::io::{IsTerminal, Read};

use crate::context::AppContext;

pub(crate) struct StatusView {
    pub context_percent: u8,
    pub claude: ClaudeUsage,
    pub codex: Option<CodexRateLimits>,
    pub gemini_bucket: Option<QuotaBucket>,
    pub gemini_tokens: Option<GeminiSessionTokens>,
    pub rpm: RpmUsage,
    pub profile: Profile,
    pub codex_label: String,
    pub gemini_label: String,
    pub now: DateTime<Utc>,
}

pub(crate) fn handle_status() -> Result<()> {
    let host = read_host_json();
    let ctx = AppContext::load();
    let scheduler = ctx.refresh_scheduler();
    let budget = |source| ctx.config.cache.stale_budget(source);

    let codex: Option<CodexRateLimits> = serve_and_revalidate(
        &ctx.cache(CacheSource::CodexRateLimits),
        None,
        budget(CacheSource::CodexRateLimits),
        &RefreshRequest::new(CacheSource::CodexRateLimits),
        scheduler.as_ref(),
    );
    let gemini_tokens: Option<GeminiSessionTokens> = serve_and_revalidate(
        &ctx.cache(CacheSource::GeminiSession),
        None,
        budget(CacheSource::GeminiSession),
        &RefreshRequest::new(CacheSource::GeminiSession),
        scheduler.as_ref(),
    );

    let gemini_account = ctx.gemini_account();
    let auth = ctx.gemini_auth(&gemini_account);
    let quota: Option<GeminiQuota> = serve_and_revalidate(
        &ctx.cache(CacheSource::GeminiQuota),
        Some(auth.cache_key.as_str()),
        budget(CacheSource::GeminiQuota),
        &RefreshRequest::for_account(CacheSource::GeminiQuota, gemini_account),
        scheduler.as_ref(),
    );
    let model = gemini_tokens.as_ref().and_then(|t| t.model.as_deref());
    let gemini_bucket = quota
        .as_ref()
        .and_then(|q| q.bucket_for(model, &ctx.config.gemini.fallback_model))
        .cloned();

    let accounts = ctx.accounts();
    let codex_email = paths::codex_auth_path().and_then(|path| read_codex_email(&path));
    let now = Utc::now();
    let view = StatusView {
        context_percent: context_percent(&host),
        claude: ClaudeTokenStats::load(&paths::claude_stats_path(&ctx.state_dir))
            .usage(now.timestamp_millis()),
        codex,
        gemini_bucket,
        gemini_tokens,
        rpm: ctx.rpm_tracker().usage(now.timestamp_millis()),
        profile: ctx.profile_store().load(),
        codex_label: accounts.active_label(Provider::Codex, codex_email.as_deref()),
        gemini_label: accounts.active_label(Provider::Gemini, None),
        now,
    };
    println!("{}", render_status(&view));
    Ok(())
}

/// Host status-line JSON, if any was piped in.
fn read_host_json() -> Value {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Value::Null;
    }
    let mut raw = String::new();
    if stdin.lock().read_to_string(&mut raw).is_err() {
        return Value::Null;
    }
    serde_json::from_str(raw.trim()).unwrap_or(Value::Null)
}

/// Host-reported context usage, else derived from token counts.
pub(crate) fn context_percent(host: &Value) -> u8 {
    let window = &host["context_window"];
    if let Some(percent) = window.get("used_percentage").and_then(Value::as_f64) {
        return clamp_percent(percent);
    }
    let usage = &window["current_usage"];
    let used: u64 = [
        "input_tokens",
        "cache_creation_input_tokens",
        "cache_read_input_tokens",
    ]
    .iter()
    .map(|key| value_to_u64(&usage[*key]))
    .sum();
    let capacity = value_to_u64(&window["context_window_size"]);
    if capacity == 0 {
        return 0;
    }
    clamp_percent(used as f64 / capacity as f64 * 100.0)
}

fn qos_section(state: &AccountState, now: DateTime<Utc>) -> String {
    let mut parts = vec![format!(
        "par:{}/{}",
        state.max_parallel, state.max_parallel_cap
    )];
    let cooldown = state.cooldown_remaining_secs(now);
    if cooldown > 0 {
        parts.push(format!("cd:{cooldown}s"));
    }
    if state.recent_429 > 0 {
        parts.push(format!("429:{}", state.recent_429));
    }
    if state.recent_timeout > 0 {
        parts.push(format!("to:{}", state.recent_timeout));
    }
    parts.join(" ")
}

/// `5h:15%(2h05m)`; the projection is left out when there is none.
fn window_section(name: &str, estimate: &WindowEstimate) -> String {
    match estimate.remaining_ms {
        Some(ms) => format!("{name}:{}%({})", estimate.percent, format_duration(ms)),
        None => format!("{name}:{}%", estimate.percent),
    }
}

fn claude_row(usage: &ClaudeUsage, context_percent: u8) -> String {
    format!(
        "c: {} {} | ctx:{context_percent}%",
        window_section("5h", &usage.five_hour),
        window_section("wk", &usage.weekly)
    )
}

fn codex_quota(limits: Option<&CodexRateLimits>) -> String {
    let main = limits.and_then(CodexRateLimits::main_bucket);
    let percent = |window: Option<&qos_sources::RateWindow>| {
        window.map(qos_sources::RateWindow::used_percent).unwrap_or(0)
    };
    let five_hour = percent(main.and_then(|b| b.primary.as_ref()));
    let weekly = percent(main.and_then(|b| b.secondary.as_ref()));
    format!("5h:{five_hour}% wk:{weekly}%")
}

fn gemini_quota(
    bucket: Option<&QuotaBucket>,
    rpm: &RpmUsage,
    tokens: Option<&GeminiSessionTokens>,
) -> String {
    let daily = match bucket {
        Some(bucket) => format!("{}%", bucket.used_percent()),
        None => "--%".to_string(),
    };
    let mut section = format!("1d:{daily} rpm:{}/{}", rpm.count, rpm.limit);
    if let Some(tokens) = tokens.filter(|t| t.total > 0) {
        section.push_str(&format!(" tok:{}", tokens.total));
    }
    section
}

pub(crate) fn render_status(view: &StatusView) -> String {
    let row = |provider: Provider, quota: String, label: &str| {
        let state = &view.profile.provider(provider).current;
        format!(
            "{}: {quota} | {} | {label}",
            provider.marker(),
            qos_section(state, view.now)
        )
    };
    [
        claude_row(&view.claude, view.context_percent),
        row(
            Provider::Codex,
            codex_quota(view.codex.as_ref()),
            &view.codex_label,
        ),
        row(
            Provider::Gemini,
            gemini_quota(
                view.gemini_bucket.as_ref(),
                &view.rpm,
                view.gemini_tokens.as_ref(),
            ),
            &view.gemini_label,
        ),
    ]
    .join("\n")
}
