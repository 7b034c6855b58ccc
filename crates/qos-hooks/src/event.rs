use clap::ValueEnum;

/// Host tool-use hook the binary is invoked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
pub enum HookEvent {
    /// Before a tool call: inject the throttling hint.
    PreToolUse,
    /// After a successful tool call: feed latency to the controller.
    PostToolUse,
    /// After a failed tool call: feed the error text to the controller.
    PostToolUseFailure,
}

impl HookEvent {
    /// Event name as the host spells it in `hookEventName`.
    pub fn host_name(&self) -> &'static str {
        match self {
            HookEvent::PreToolUse => "PreToolUse",
            HookEvent::PostToolUse => "PostToolUse",
            HookEvent::PostToolUseFailure => "PostToolUseFailure",
        }
    }

    /// Only the failure hook considers non-Bash tools.
    pub fn requires_shell_tool(&self) -> bool {
        !matches!(self, HookEvent::PostToolUseFailure)
    }
}
