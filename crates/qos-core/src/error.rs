#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AppError {
    #[error("Unknown provider '{0}': expected codex or gemini")]
    UnknownProvider(String),

    #[error("Invalid account id '{0}': allowed characters are [A-Za-z0-9_.@-]")]
    InvalidAccountId(String),

    #[error(
        "Unknown refresh source '{0}': expected codex-rate-limits, gemini-quota or gemini-session"
    )]
    UnknownCacheSource(String),

    #[error("Another process holds {0}")]
    LockContended(String),
}
