//! Fire-and-forget background refresh of stale cache files.
//!
//! A refresh is the same executable re-invoked as
//! `<exe> refresh <source> [--account <id>]`, detached from the caller's
//! stdio and process group. The caller never waits for it and never sees
//! its outcome.

use qos_core::CacheSource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::gate::CacheDecision;
use crate::store::{CacheFile, now_ms};

/// Identifies one refresh job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefreshRequest {
    pub source: CacheSource,
    pub account: Option<String>,
}

impl RefreshRequest {
    pub fn new(source: CacheSource) -> Self {
        Self {
            source,
            account: None,
        }
    }

    pub fn for_account(source: CacheSource, account: impl Into<String>) -> Self {
        Self {
            source,
            account: Some(account.into()),
        }
    }

    /// Command-line arguments of the refresh invocation.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["refresh".to_string(), self.source.as_str().to_string()];
        if let Some(account) = &self.account {
            args.push("--account".to_string());
            args.push(account.clone());
        }
        args
    }
}

/// Starts refresh jobs without waiting for them.
///
/// Implementations must not fail into the caller: errors are logged and
/// dropped.
pub trait RefreshScheduler {
    fn schedule(&self, request: &RefreshRequest);
}

/// Spawns a detached child process per request.
#[derive(Debug, Clone)]
pub struct ProcessRefreshScheduler {
    program: PathBuf,
}

impl ProcessRefreshScheduler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Scheduler re-invoking the running executable.
    pub fn current_exe() -> Option<Self> {
        match std::env::current_exe() {
            Ok(path) => Some(Self::new(path)),
            Err(error) => {
                tracing::debug!(%error, "Cannot resolve current executable, refresh disabled");
                None
            }
        }
    }

    fn command(&self, request: &RefreshRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(request.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group so the host's signals to the caller's group do
        // not reach the refresh.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

impl RefreshScheduler for ProcessRefreshScheduler {
    fn schedule(&self, request: &RefreshRequest) {
        match self.command(request).spawn() {
            Ok(child) => {
                tracing::debug!(
                    source = %request.source,
                    account = ?request.account,
                    pid = child.id(),
                    "Scheduled background refresh"
                );
                // Dropping the handle neither waits for nor kills the child.
                drop(child);
            }
            Err(error) => {
                tracing::debug!(source = %request.source, %error, "Failed to schedule refresh");
            }
        }
    }
}

/// Serve `cache` stale-while-revalidate: return the usable payload and, if
/// the gate asks for it, hand `request` to `scheduler`.
pub fn serve_and_revalidate<T>(
    cache: &CacheFile<T>,
    cache_key: Option<&str>,
    stale_budget: Duration,
    request: &RefreshRequest,
    scheduler: &dyn RefreshScheduler,
) -> Option<T>
where
    T: Serialize + DeserializeOwned,
{
    let CacheDecision {
        payload,
        should_refresh,
        reason,
    } = cache.evaluate(cache_key, stale_budget, false, now_ms());
    tracing::debug!(
        source = %request.source,
        reason = reason.as_str(),
        should_refresh,
        "Cache decision"
    );
    if should_refresh {
        scheduler.schedule(request);
    }
    payload
}
