//! Provider and account detection from a shell command line.

use qos_core::Provider;
use regex::Regex;
use std::sync::OnceLock;

struct CommandPatterns {
    codex: Regex,
    gemini: Regex,
    /// Tried in order; capture group 1 is the account id.
    account: [Regex; 3],
}

fn build_command_patterns() -> Option<CommandPatterns> {
    Some(CommandPatterns {
        codex: Regex::new(r"(?i)\bcodex\s+exec\b").ok()?,
        gemini: Regex::new(r"(?i)\bgemini\s+-y\s+-p\b").ok()?,
        account: [
            Regex::new(
                r"(?:QOS_HUD_ACCOUNT|OMC_ACCOUNT|CODEX_PROFILE|GEMINI_PROFILE)=([A-Za-z0-9_.@-]+)",
            )
            .ok()?,
            Regex::new(r"--account(?:=|\s+)([A-Za-z0-9_.@-]+)").ok()?,
            Regex::new(r"--profile(?:=|\s+)([A-Za-z0-9_.@-]+)").ok()?,
        ],
    })
}

fn command_patterns() -> Option<&'static CommandPatterns> {
    static PATTERNS: OnceLock<Option<CommandPatterns>> = OnceLock::new();
    PATTERNS.get_or_init(build_command_patterns).as_ref()
}

/// Provider invoked by `command`: `codex exec ...` or `gemini -y -p ...`.
pub fn infer_provider(command: &str) -> Option<Provider> {
    let patterns = command_patterns()?;
    if patterns.codex.is_match(command) {
        Some(Provider::Codex)
    } else if patterns.gemini.is_match(command) {
        Some(Provider::Gemini)
    } else {
        None
    }
}

/// Fallback for failure events of non-shell tools (e.g. an MCP tool whose
/// name mentions the provider).
pub fn provider_from_tool_name(tool_name: &str) -> Option<Provider> {
    let lower = tool_name.to_ascii_lowercase();
    if lower.contains("gemini") {
        Some(Provider::Gemini)
    } else if lower.contains("codex") {
        Some(Provider::Codex)
    } else {
        None
    }
}

/// Account id named in `command`, if any.
pub fn extract_account_id(command: &str) -> Option<String> {
    command_patterns()
        .and_then(|patterns| {
            patterns
                .account
                .iter()
                .find_map(|re| re.captures(command)?.get(1))
        })
        .map(|m| m.as_str().to_string())
}
