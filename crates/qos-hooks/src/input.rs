//! Decoding of the host's hook payload.
//!
//! The host sends one JSON object on stdin. Field names vary between host
//! versions (`tool_name` vs `toolName`, several duration keys) and any
//! field may be missing, so decoding never fails: absent or malformed
//! input yields an empty [`HookInput`].

use qos_core::lenient::value_to_u64;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookInput {
    pub tool_name: String,
    pub command: String,
    /// Empty on the success path.
    pub error: String,
    pub duration_ms: u64,
}

fn first_string<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
}

impl HookInput {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(data) => Self::from_value(&data),
            Err(error) => {
                tracing::debug!(%error, "Ignoring malformed hook input");
                Self::default()
            }
        }
    }

    pub fn from_value(data: &Value) -> Self {
        let command = ["tool_input", "toolInput"]
            .iter()
            .filter_map(|key| data.get(*key))
            .find(|v| v.is_object())
            .and_then(|input| input.get("command"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let duration_ms = ["duration_ms", "tool_duration_ms", "elapsed_ms"]
            .iter()
            .filter_map(|key| data.get(*key))
            .map(value_to_u64)
            .find(|ms| *ms > 0)
            .unwrap_or(0);

        Self {
            tool_name: first_string(data, &["tool_name", "toolName"])
                .unwrap_or_default()
                .to_string(),
            command: command.to_string(),
            error: first_string(data, &["error"]).unwrap_or_default().to_string(),
            duration_ms,
        }
    }

    pub fn is_shell_tool(&self) -> bool {
        matches!(self.tool_name.as_str(), "Bash" | "bash")
    }
}
