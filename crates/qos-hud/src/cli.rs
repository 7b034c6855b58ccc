use clap::{Parser, Subcommand};
use qos_core::{CacheSource, Provider};
use qos_hooks::HookEvent;

#[derive(Parser)]
#[command(name = "qos-hud")]
#[command(about = "QoS throttle and status line for AI CLI providers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Handle a host tool-use hook (JSON payload on stdin)
    Hook {
        #[arg(value_enum)]
        event: HookEvent,
    },

    /// Print the current throttling hint for a provider
    Hint {
        #[arg(value_enum)]
        provider: Provider,

        /// Account id (defaults to the provider's last used account)
        #[arg(long)]
        account: Option<String>,
    },

    /// Refresh one cached snapshot and exit (spawned in the background)
    Refresh {
        #[arg(value_enum)]
        source: CacheSource,

        /// Account the snapshot belongs to (gemini-quota only)
        #[arg(long)]
        account: Option<String>,
    },

    /// Print the status view (optional host JSON on stdin)
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a commented config template
    Init,
}
