use qos_core::CacheSource;
use std::path::{Path, PathBuf};

/// XDG app name used for every config/state path.
pub const APP_NAME: &str = "qos-hud";
/// Relocates the whole state directory (profile, caches, locks).
pub const STATE_DIR_ENV: &str = "QOS_HUD_STATE_DIR";
/// Points at an alternative `config.toml`.
pub const CONFIG_PATH_ENV: &str = "QOS_HUD_CONFIG";

pub const PROFILE_FILE_NAME: &str = "cli_qos_profile.json";
pub const ACCOUNTS_FILE_NAME: &str = "accounts.json";
pub const ACCOUNTS_STATE_FILE_NAME: &str = "cli_accounts_state.json";
pub const GEMINI_RPM_FILE_NAME: &str = "gemini_rpm_tracker.json";
pub const GEMINI_PROJECT_FILE_NAME: &str = "gemini_project_id.json";
pub const CLAUDE_STATS_FILE_NAME: &str = "session-token-stats.json";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn resolve_state_dir(override_dir: Option<String>, xdg_dir: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = override_dir {
        return PathBuf::from(dir);
    }
    xdg_dir.unwrap_or_else(state_dir_fallback)
}

/// State directory: `$QOS_HUD_STATE_DIR`, else the XDG state dir
/// (data-local dir on platforms without one), else a temp-dir fallback.
pub fn state_dir() -> PathBuf {
    let xdg = project_dirs().map(|dirs| {
        dirs.state_dir()
            .unwrap_or_else(|| dirs.data_local_dir())
            .to_path_buf()
    });
    resolve_state_dir(non_empty_env(STATE_DIR_ENV), xdg)
}

pub fn state_dir_fallback() -> PathBuf {
    std::env::temp_dir().join(format!("{APP_NAME}-state"))
}

pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// `$QOS_HUD_CONFIG`, else `<config dir>/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    config_dir().map(|dir| dir.join("config.toml"))
}

pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

pub fn profile_path(state_dir: &Path) -> PathBuf {
    state_dir.join(PROFILE_FILE_NAME)
}

/// Provider account list; lives next to `config.toml`.
pub fn accounts_config_path() -> Option<PathBuf> {
    config_path().and_then(|p| p.parent().map(|dir| dir.join(ACCOUNTS_FILE_NAME)))
}

pub fn accounts_state_path(state_dir: &Path) -> PathBuf {
    state_dir.join(ACCOUNTS_STATE_FILE_NAME)
}

pub fn gemini_rpm_path(state_dir: &Path) -> PathBuf {
    state_dir.join(GEMINI_RPM_FILE_NAME)
}

/// Cache file of one snapshot source.
pub fn cache_path(state_dir: &Path, source: CacheSource) -> PathBuf {
    let name = match source {
        CacheSource::CodexRateLimits => "codex_rate_limits_cache.json",
        CacheSource::GeminiQuota => "gemini_quota_cache.json",
        CacheSource::GeminiSession => "gemini_session_tokens_cache.json",
    };
    state_dir.join(name)
}

pub fn gemini_project_path(state_dir: &Path) -> PathBuf {
    state_dir.join(GEMINI_PROJECT_FILE_NAME)
}

/// `$CODEX_HOME`, else `~/.codex`.
pub fn codex_home() -> Option<PathBuf> {
    non_empty_env("CODEX_HOME")
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|home| home.join(".codex")))
}

/// Claude session token counters.
pub fn claude_stats_path(state_dir: &Path) -> PathBuf {
    state_dir.join(CLAUDE_STATS_FILE_NAME)
}

pub fn codex_auth_path() -> Option<PathBuf> {
    codex_home().map(|home| home.join("auth.json"))
}

pub fn gemini_home() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".gemini"))
}

/// Directory holding per-source refresh locks.
pub fn locks_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("locks")
}
