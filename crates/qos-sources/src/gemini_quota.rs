//! Gemini daily quota buckets from the Code Assist API.
//!
//! Flow per refresh: resolve the Code Assist project id (cached in its own
//! file, bound to the same account/credential key as the quota), then call
//! `retrieveUserQuota`. A cached project id that yields no buckets is
//! re-resolved once. Every failure resolves to `None`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qos_cache::{CacheFile, cache_key, credential_fingerprint, now_ms};
use qos_core::CacheSource;
use qos_core::lenient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::SnapshotSource;

pub const CODE_ASSIST_BASE_URL: &str = "https://cloudcode-pa.googleapis.com/v1internal";

/// Subset of `~/.gemini/oauth_creds.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthCreds {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default, deserialize_with = "lenient::epoch_millis")]
    pub expiry_date: Option<i64>,
}

impl OAuthCreds {
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Most stable credential material: refresh token, then id token, then
    /// access token.
    fn fingerprint_material(&self) -> &str {
        [&self.refresh_token, &self.id_token, &self.access_token]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }

    /// Access token, unless missing or past its expiry.
    pub fn usable_access_token(&self, now_ms: i64) -> Option<&str> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        match self.expiry_date {
            Some(expiry) if expiry < now_ms => None,
            _ => Some(token),
        }
    }
}

/// Account plus credential identity a quota snapshot is bound to.
#[derive(Debug, Clone)]
pub struct GeminiAuth {
    pub account_id: String,
    pub creds: Option<OAuthCreds>,
    pub fingerprint: String,
    pub cache_key: String,
}

impl GeminiAuth {
    pub fn load(creds_path: &Path, account_id: &str) -> Self {
        Self::from_creds(account_id, OAuthCreds::load(creds_path))
    }

    pub fn from_creds(account_id: &str, creds: Option<OAuthCreds>) -> Self {
        let fingerprint = credential_fingerprint(
            creds
                .as_ref()
                .map(OAuthCreds::fingerprint_material)
                .unwrap_or(""),
        );
        Self {
            account_id: account_id.to_string(),
            cache_key: cache_key(account_id, &fingerprint),
            fingerprint,
            creds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaBucket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_fraction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuotaBucket {
    pub fn used_percent(&self) -> u8 {
        crate::clamp_percent((1.0 - self.remaining_fraction.unwrap_or(1.0)) * 100.0)
    }

    pub fn resets_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.reset_time.as_deref()?.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiQuota {
    pub account_id: String,
    pub token_fingerprint: String,
    pub buckets: Vec<QuotaBucket>,
}

impl GeminiQuota {
    /// Bucket of `model`, else of `fallback_model`.
    pub fn bucket_for(&self, model: Option<&str>, fallback_model: &str) -> Option<&QuotaBucket> {
        let find = |wanted: &str| {
            self.buckets
                .iter()
                .find(|b| b.model_id.as_deref() == Some(wanted))
        };
        model.and_then(find).or_else(|| find(fallback_model))
    }
}

#[derive(Debug, Clone)]
pub struct GeminiQuotaClient {
    base_url: String,
    http: reqwest::Client,
    auth: GeminiAuth,
    project_cache: CacheFile<String>,
}

impl GeminiQuotaClient {
    pub fn new(auth: GeminiAuth, project_cache_path: PathBuf, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: CODE_ASSIST_BASE_URL.to_string(),
            http,
            auth,
            project_cache: CacheFile::new(project_cache_path),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn auth(&self) -> &GeminiAuth {
        &self.auth
    }

    pub async fn fetch_quota(&self, now_ms: i64) -> Option<GeminiQuota> {
        let creds = self.auth.creds.as_ref()?;
        let Some(token) = creds.usable_access_token(now_ms) else {
            tracing::debug!(account = %self.auth.account_id, "Gemini access token missing or expired");
            return None;
        };

        let cached_project = self
            .project_cache
            .read()
            .filter(|entry| entry.cache_key.as_deref() == Some(self.auth.cache_key.as_str()))
            .map(|entry| entry.payload)
            .filter(|id| !id.is_empty());
        let from_cache = cached_project.is_some();
        let project = match cached_project {
            Some(id) => id,
            None => self.resolve_project(token).await?,
        };

        let mut buckets = self.retrieve_buckets(token, &project).await;
        if buckets.is_none() && from_cache {
            tracing::debug!("Cached Code Assist project returned no quota, re-resolving");
            let project = self.resolve_project(token).await?;
            buckets = self.retrieve_buckets(token, &project).await;
        }

        Some(GeminiQuota {
            account_id: self.auth.account_id.clone(),
            token_fingerprint: self.auth.fingerprint.clone(),
            buckets: buckets?,
        })
    }

    async fn resolve_project(&self, token: &str) -> Option<String> {
        let response = self
            .post("loadCodeAssist", token, &json!({"metadata": {"pluginType": "GEMINI"}}))
            .await?;
        let project = match response.get("cloudaicompanionProject")? {
            Value::String(id) => id.clone(),
            Value::Object(obj) => obj.get("id")?.as_str()?.to_string(),
            _ => return None,
        };
        if project.is_empty() {
            return None;
        }
        if let Err(error) = self
            .project_cache
            .write(Some(self.auth.cache_key.as_str()), &project, now_ms())
        {
            tracing::debug!(error = %format!("{error:#}"), "Failed to cache Code Assist project");
        }
        Some(project)
    }

    async fn retrieve_buckets(&self, token: &str, project: &str) -> Option<Vec<QuotaBucket>> {
        let response = self
            .post("retrieveUserQuota", token, &json!({"project": project}))
            .await?;
        serde_json::from_value(response.get("buckets")?.clone()).ok()
    }

    async fn post(&self, method: &str, token: &str, body: &Value) -> Option<Value> {
        let url = format!("{}:{method}", self.base_url);
        let response = match self.http.post(&url).bearer_auth(token).json(body).send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(%method, %error, "Code Assist request failed");
                return None;
            }
        };
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%method, %status, "Code Assist request rejected");
            return None;
        }
        let text = response.text().await.ok()?;
        serde_json::from_str(&text).ok()
    }
}

#[async_trait]
impl SnapshotSource for GeminiQuotaClient {
    type Payload = GeminiQuota;

    fn cache_source(&self) -> CacheSource {
        CacheSource::GeminiQuota
    }

    fn cache_key(&self) -> Option<String> {
        Some(self.auth.cache_key.clone())
    }

    async fn fetch(&self) -> Option<GeminiQuota> {
        self.fetch_quota(now_ms()).await
    }
}

#[cfg(test)]
#[path = "gemini_quota_tests.rs"]
mod tests;
