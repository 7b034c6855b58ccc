use anyhow::{Context, Result};
use chrono::Utc;
use qos_core::PolicyTable;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::normalize::normalize;
use crate::profile::Profile;

/// Reads and transactionally rewrites the profile file.
///
/// Readers never lock and never fail: a missing or corrupt file reads as
/// the seeded defaults. Writers serialize on a sidecar lock file and
/// replace the profile with an atomic rename.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
    policies: PolicyTable,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>, policies: PolicyTable) -> Self {
        Self {
            path: path.into(),
            policies,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn load(&self) -> Profile {
        normalize(self.read_raw().as_ref(), &self.policies)
    }

    fn read_raw(&self) -> Option<Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "Failed to read profile, using defaults");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "Corrupt profile, using defaults");
                None
            }
        }
    }

    /// Overwrite the profile without taking the lock.
    ///
    /// Prefer [`ProfileStore::transact`] for read-modify-write.
    pub fn save(&self, profile: &Profile) -> Result<()> {
        let json = serde_json::to_string_pretty(profile).context("Failed to serialize profile")?;
        qos_lock::write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to write profile: {}", self.path.display()))
    }

    /// Run `mutate` on a freshly read profile while holding the profile lock,
    /// then persist the result.
    ///
    /// Concurrent transactions from other processes queue on the lock, so no
    /// update is lost between the read and the write.
    pub fn transact<T>(&self, mutate: impl FnOnce(&mut Profile) -> T) -> Result<T> {
        let lock_path = qos_lock::sidecar_lock_path(&self.path);
        let _lock = qos_lock::lock_exclusive(&lock_path, "profile update")
            .with_context(|| format!("Failed to lock profile: {}", self.path.display()))?;

        let mut profile = self.load();
        let result = mutate(&mut profile);
        profile.updated_at = Some(Utc::now());
        self.save(&profile)?;
        Ok(result)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
