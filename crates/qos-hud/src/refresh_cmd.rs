//! `qos-hud refresh <source>`: one fetch-and-write cycle, always exit 0.

use anyhow::Result;
use qos_config::paths;
use qos_core::{AppError, CacheSource, validate_account_id};
use qos_sources::{
    CodexRateLimitScanner, GeminiQuotaClient, GeminiSessionScanner, refresh_into,
};

use crate::context::AppContext;

pub(crate) async fn handle_refresh(source: CacheSource, account: Option<String>) -> Result<()> {
    let ctx = AppContext::load();
    if let Err(error) = refresh(&ctx, source, account).await {
        tracing::debug!(source = %source, error = %format!("{error:#}"), "Refresh skipped");
    }
    Ok(())
}

async fn refresh(ctx: &AppContext, source: CacheSource, account: Option<String>) -> Result<()> {
    let account = match account {
        Some(id) => Some(validate_account_id(&id)?),
        None if source.is_account_bound() => Some(ctx.gemini_account()),
        None => None,
    };

    // Single flight per source (and account): a second refresh exits at once.
    let lock_name = match &account {
        Some(id) => format!("refresh-{}-{id}.lock", source.as_str()),
        None => format!("refresh-{}.lock", source.as_str()),
    };
    let lock_path = paths::locks_dir(&ctx.state_dir).join(lock_name);
    let purpose = format!("refresh of {source}");
    let Some(_lock) = qos_lock::try_lock_exclusive(&lock_path, &purpose)? else {
        let holder = qos_lock::describe_holder(&lock_path).unwrap_or_default();
        tracing::debug!(%holder, "Refresh already running");
        return Err(AppError::LockContended(purpose).into());
    };

    match source {
        CacheSource::CodexRateLimits => {
            let home = paths::codex_home().ok_or_else(|| anyhow::anyhow!("No home directory"))?;
            let scanner = CodexRateLimitScanner::new(home.join("sessions"));
            refresh_into(&scanner, &ctx.cache(source)).await;
        }
        CacheSource::GeminiSession => {
            let home = paths::gemini_home().ok_or_else(|| anyhow::anyhow!("No home directory"))?;
            let scanner = GeminiSessionScanner::new(home.join("tmp"));
            refresh_into(&scanner, &ctx.cache(source)).await;
        }
        CacheSource::GeminiQuota => {
            let Some(account) = account else {
                anyhow::bail!("{source} needs an account");
            };
            let client = GeminiQuotaClient::new(
                ctx.gemini_auth(&account),
                paths::gemini_project_path(&ctx.state_dir),
                ctx.config.cache.fetch_timeout(),
            )?;
            refresh_into(&client, &ctx.cache(source)).await;
        }
    }
    Ok(())
}
