mod services;
mod watch;

pub use services::ServicesCommand;
pub use watch::WatchCommand;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use conduit_core::config::{ConduitConfig, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Conduit - cluster leadership for namespaces
#[derive(Parser)]
#[command(name = "conduit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Follow leadership of namespaces until Ctrl-C.
    Watch(WatchCommand),

    /// List the configured cluster services.
    Services(ServicesCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        match self.command {
            Commands::Watch(cmd) => cmd.execute().await,
            Commands::Services(cmd) => cmd.execute().await,
        }
    }
}

/// Load the configuration file, failing with a hint when it is missing.
fn load_config(path: &str) -> Result<ConduitConfig> {
    if !Path::new(path).exists() {
        anyhow::bail!(
            "Configuration file not found: {}\nPass --config to point at a conduit.toml.",
            path
        );
    }
    Ok(ConduitConfig::from_file(path)?)
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
}
