use anyhow::Result;
use qos_cache::now_ms;
use qos_core::Provider;
use qos_hooks::{HookEvent, HookInput, HookOutput, ProviderCall, resolve_call};
use std::io::Read;

use crate::context::AppContext;

/// Hooks never block the host: every path prints an envelope with
/// `continue: true` and returns `Ok`.
pub(crate) fn handle_hook(event: HookEvent) -> Result<()> {
    let mut raw = String::new();
    if let Err(error) = std::io::stdin().read_to_string(&mut raw) {
        tracing::debug!(%error, "Failed to read hook input");
    }
    let input = HookInput::parse(&raw);
    let output = match resolve_call(event, &input) {
        Some(call) => dispatch(event, &input, &call, &AppContext::load()),
        None => HookOutput::pass(),
    };
    println!("{}", output.to_json());
    Ok(())
}

fn dispatch(event: HookEvent, input: &HookInput, call: &ProviderCall, ctx: &AppContext) -> HookOutput {
    let controller = ctx.controller();
    match event {
        HookEvent::PreToolUse => {
            if call.provider == Provider::Gemini
                && let Err(error) = ctx.rpm_tracker().record(now_ms())
            {
                tracing::warn!(error = %format!("{error:#}"), "Failed to record Gemini request");
            }
            // No named account: show the provider-level mirror.
            let hint = controller.hint(call.provider, call.account_id.as_deref());
            HookOutput::with_context(
                event,
                format!("{hint}\n[STATE] {}", controller.store().path().display()),
            )
        }
        HookEvent::PostToolUse => {
            if let Err(error) =
                controller.on_success(call.provider, call.recorded_account(), input.duration_ms as f64)
            {
                tracing::warn!(
                    provider = %call.provider,
                    account = call.recorded_account(),
                    error = %format!("{error:#}"),
                    "Failed to record success"
                );
            }
            HookOutput::pass()
        }
        HookEvent::PostToolUseFailure => {
            if let Err(error) = controller.on_failure(call.provider, call.recorded_account(), &input.error) {
                tracing::warn!(
                    provider = %call.provider,
                    account = call.recorded_account(),
                    error = %format!("{error:#}"),
                    "Failed to record failure"
                );
            }
            HookOutput::pass()
        }
    }
}
