use serde::Serialize;

use crate::event::HookEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    pub additional_context: String,
}

/// Envelope printed to stdout for every hook invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    #[serde(rename = "continue")]
    pub continue_: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress_output: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

impl HookOutput {
    /// Let the tool call proceed, nothing to show.
    pub fn pass() -> Self {
        Self {
            continue_: true,
            suppress_output: Some(true),
            hook_specific_output: None,
        }
    }

    /// Let the tool call proceed and add `context` to the model's input.
    pub fn with_context(event: HookEvent, context: String) -> Self {
        Self {
            continue_: true,
            suppress_output: None,
            hook_specific_output: Some(HookSpecificOutput {
                hook_event_name: event.host_name().to_string(),
                additional_context: context,
            }),
        }
    }

    pub fn to_json(&self) -> String {
        // Fallback is the same envelope as `pass()`.
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"continue":true,"suppressOutput":true}"#.to_string())
    }
}
