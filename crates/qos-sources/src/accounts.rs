//! Which account each provider is currently using.
//!
//! `accounts.json` lists the configured accounts per provider;
//! the accounts state file remembers the last one selected. Both are
//! optional and read leniently.

use qos_core::Provider;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AccountsConfig {
    #[serde(default)]
    providers: HashMap<String, Vec<AccountEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProviderSelection {
    #[serde(default)]
    last_selected_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AccountsState {
    #[serde(default)]
    providers: HashMap<String, ProviderSelection>,
}

fn read_lenient<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    let Ok(content) = fs::read_to_string(path) else {
        return T::default();
    };
    serde_json::from_str(&content).unwrap_or_else(|error| {
        tracing::debug!(path = %path.display(), %error, "Ignoring malformed accounts file");
        T::default()
    })
}

#[derive(Debug, Clone, Default)]
pub struct AccountDirectory {
    config: AccountsConfig,
    state: AccountsState,
}

impl AccountDirectory {
    pub fn load(config_path: Option<&Path>, state_path: &Path) -> Self {
        Self {
            config: config_path.map(read_lenient).unwrap_or_default(),
            state: read_lenient(state_path),
        }
    }

    fn configured(&self, provider: Provider) -> &[AccountEntry] {
        self.config
            .providers
            .get(provider.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn last_selected(&self, provider: Provider) -> Option<&str> {
        self.state
            .providers
            .get(provider.as_str())?
            .last_selected_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Last selected id, else the first configured one, else `<provider>-main`.
    pub fn active_account_id(&self, provider: Provider) -> String {
        if let Some(id) = self.last_selected(provider) {
            return id.to_string();
        }
        self.configured(provider)
            .first()
            .map(|entry| entry.id.clone())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| provider.fallback_account_id())
    }

    /// Display label of the active account: `signed_in` (the identity the
    /// provider CLI reports) when known, else its label or id. Cut at `@`.
    pub fn active_label(&self, provider: Provider, signed_in: Option<&str>) -> String {
        if let Some(identity) = signed_in.filter(|id| !id.is_empty()) {
            return local_part(identity).to_string();
        }
        let configured = self.configured(provider);
        let picked = self
            .last_selected(provider)
            .and_then(|id| configured.iter().find(|entry| entry.id == id))
            .or_else(|| configured.first());
        let label = picked
            .and_then(|entry| entry.label.clone().filter(|l| !l.is_empty()))
            .or_else(|| picked.map(|entry| entry.id.clone()).filter(|id| !id.is_empty()))
            .unwrap_or_else(|| provider.fallback_account_id());
        local_part(&label).to_string()
    }
}

fn local_part(label: &str) -> &str {
    label.split_once('@').map_or(label, |(local, _)| local)
}
