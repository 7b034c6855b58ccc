use anyhow::Result;
use qos_core::{Provider, validate_account_id};

use crate::context::AppContext;

pub(crate) fn handle_hint(provider: Provider, account: Option<String>) -> Result<()> {
    let account = account.map(|id| validate_account_id(&id)).transpose()?;
    let hint = AppContext::load()
        .controller()
        .hint(provider, account.as_deref());
    println!("{hint}");
    Ok(())
}
