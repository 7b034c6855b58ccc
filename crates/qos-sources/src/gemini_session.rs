//! Token usage of the most recently updated Gemini CLI chat
//! (`<gemini home>/tmp/*/chats/*.json`).

use async_trait::async_trait;
use qos_core::CacheSource;
use qos_core::lenient::{value_to_epoch_millis, value_to_u64};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::SnapshotSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiSessionTokens {
    pub input: u64,
    pub output: u64,
    pub total: u64,
    /// Model of the last message that named one.
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiSessionScanner {
    tmp_dir: PathBuf,
}

impl GeminiSessionScanner {
    pub fn new(tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
        }
    }

    pub fn scan(&self) -> Option<GeminiSessionTokens> {
        let mut best: Option<(i64, GeminiSessionTokens)> = None;
        for project in fs::read_dir(&self.tmp_dir).ok()?.flatten() {
            let chats = project.path().join("chats");
            let Ok(files) = fs::read_dir(&chats) else {
                continue;
            };
            for file in files.flatten() {
                let path = file.path();
                if path.extension().is_none_or(|ext| ext != "json") {
                    continue;
                }
                let Some((updated_ms, tokens)) = read_chat(&path) else {
                    continue;
                };
                if best.as_ref().is_none_or(|(best_ms, _)| updated_ms > *best_ms) {
                    best = Some((updated_ms, tokens));
                }
            }
        }
        best.map(|(_, tokens)| tokens)
    }
}

fn read_chat(path: &Path) -> Option<(i64, GeminiSessionTokens)> {
    let content = fs::read_to_string(path).ok()?;
    let chat: Value = serde_json::from_str(&content).ok()?;
    let last_updated = chat.get("lastUpdated");
    let updated_ms = last_updated.and_then(value_to_epoch_millis).unwrap_or(0);

    let mut input = 0;
    let mut output = 0;
    let mut model = None;
    for message in chat
        .get("messages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if let Some(tokens) = message.get("tokens") {
            input += tokens.get("input").map(value_to_u64).unwrap_or(0);
            output += tokens.get("output").map(value_to_u64).unwrap_or(0);
        }
        if let Some(name) = message.get("model").and_then(Value::as_str) {
            model = Some(name.to_string());
        }
    }

    Some((
        updated_ms,
        GeminiSessionTokens {
            input,
            output,
            total: input + output,
            model,
            last_updated: last_updated.and_then(Value::as_str).map(String::from),
        },
    ))
}

#[async_trait]
impl SnapshotSource for GeminiSessionScanner {
    type Payload = GeminiSessionTokens;

    fn cache_source(&self) -> CacheSource {
        CacheSource::GeminiSession
    }

    async fn fetch(&self) -> Option<GeminiSessionTokens> {
        self.scan()
    }
}
