//! Host tool-use hook protocol: the events, the JSON payload coming in on
//! stdin, provider/account detection from the command, and the envelope
//! going out on stdout.

pub mod detect;
pub mod event;
pub mod input;
pub mod output;

pub use detect::{extract_account_id, infer_provider, provider_from_tool_name};
pub use event::HookEvent;
pub use input::HookInput;
pub use output::{HookOutput, HookSpecificOutput};

use qos_core::{DEFAULT_ACCOUNT_ID, Provider};

/// A hook payload resolved to the provider call it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub provider: Provider,
    /// Account named by the command; `None` when it names none.
    pub account_id: Option<String>,
}

impl ProviderCall {
    /// Account the outcome of this call is recorded against.
    pub fn recorded_account(&self) -> &str {
        self.account_id.as_deref().unwrap_or(DEFAULT_ACCOUNT_ID)
    }
}

/// Resolve `input` for `event`; `None` when the call is not a provider call
/// this hook should act on.
pub fn resolve_call(event: HookEvent, input: &HookInput) -> Option<ProviderCall> {
    if event.requires_shell_tool() && !input.is_shell_tool() {
        return None;
    }
    if event == HookEvent::PostToolUseFailure && input.error.is_empty() {
        return None;
    }
    let provider = infer_provider(&input.command).or_else(|| match event {
        HookEvent::PostToolUseFailure => provider_from_tool_name(&input.tool_name),
        _ => None,
    })?;
    Some(ProviderCall {
        provider,
        account_id: extract_account_id(&input.command),
    })
}
