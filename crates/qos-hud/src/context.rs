//! Per-invocation wiring: configuration, state directory, and the
//! components built from them.

use qos_cache::{CacheFile, ProcessRefreshScheduler, RefreshRequest, RefreshScheduler};
use qos_config::{GlobalConfig, paths};
use qos_core::{CacheSource, Provider};
use qos_scheduler::ConcurrencyController;
use qos_sources::{AccountDirectory, GeminiAuth, RpmTracker};
use qos_state::ProfileStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;

pub(crate) struct AppContext {
    pub config: GlobalConfig,
    pub state_dir: PathBuf,
}

impl AppContext {
    pub fn load() -> Self {
        let state_dir = paths::state_dir();
        tracing::debug!(state_dir = %state_dir.display(), "Resolved state directory");
        Self {
            config: GlobalConfig::load_or_default(),
            state_dir,
        }
    }

    pub fn profile_store(&self) -> ProfileStore {
        ProfileStore::new(
            paths::profile_path(&self.state_dir),
            self.config.policy_table(),
        )
    }

    pub fn controller(&self) -> ConcurrencyController {
        ConcurrencyController::new(self.profile_store(), self.config.policy.clone())
    }

    pub fn cache<T: Serialize + DeserializeOwned>(&self, source: CacheSource) -> CacheFile<T> {
        CacheFile::new(paths::cache_path(&self.state_dir, source))
    }

    pub fn rpm_tracker(&self) -> RpmTracker {
        RpmTracker::new(
            paths::gemini_rpm_path(&self.state_dir),
            self.config.gemini.rpm_limit,
        )
    }

    pub fn accounts(&self) -> AccountDirectory {
        AccountDirectory::load(
            paths::accounts_config_path().as_deref(),
            &paths::accounts_state_path(&self.state_dir),
        )
    }

    pub fn gemini_auth(&self, account_id: &str) -> GeminiAuth {
        match paths::gemini_home() {
            Some(home) => GeminiAuth::load(&home.join("oauth_creds.json"), account_id),
            None => GeminiAuth::from_creds(account_id, None),
        }
    }

    /// Gemini account the status view and quota refresh act for.
    pub fn gemini_account(&self) -> String {
        self.accounts().active_account_id(Provider::Gemini)
    }

    pub fn refresh_scheduler(&self) -> Box<dyn RefreshScheduler> {
        match ProcessRefreshScheduler::current_exe() {
            Some(scheduler) => Box::new(scheduler),
            None => Box::new(NoRefresh),
        }
    }
}

/// Used when the running executable cannot be re-invoked.
struct NoRefresh;

impl RefreshScheduler for NoRefresh {
    fn schedule(&self, _request: &RefreshRequest) {}
}
