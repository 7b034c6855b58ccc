use anyhow::Result;
use clap::Parser;

mod cli;
mod config_cmds;
mod context;
mod hint_cmd;
mod hook_cmd;
mod refresh_cmd;
mod status_cmd;

use cli::{Cli, Commands, ConfigCommands};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the hook/status protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Hook { event } => hook_cmd::handle_hook(event),
        Commands::Hint { provider, account } => hint_cmd::handle_hint(provider, account),
        Commands::Refresh { source, account } => {
            refresh_cmd::handle_refresh(source, account).await
        }
        Commands::Status => status_cmd::handle_status(),
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => config_cmds::handle_config_show(),
            ConfigCommands::Init => config_cmds::handle_config_init(),
        },
    }
}
