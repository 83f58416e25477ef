use anyhow::Result;
use clap::Parser;
use console::style;
use tracing::info;

use crate::runtime::Conduit;

/// Follow leadership of namespaces.
#[derive(Parser)]
pub struct WatchCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "conduit.toml")]
    pub config: String,

    /// Namespace to watch, in addition to the configured ones. Repeatable.
    #[arg(short, long = "namespace")]
    pub namespaces: Vec<String>,

    /// Member id (overrides `[node] id`).
    #[arg(long)]
    pub member_id: Option<String>,
}

impl WatchCommand {
    /// Execute the watch command.
    pub async fn execute(self) -> Result<()> {
        let config = super::load_config(&self.config)?;
        super::init_tracing(&config.observability.logging);

        info!("Loaded configuration from {}", self.config);

        let mut builder = Conduit::builder().config(config);
        if let Some(member_id) = self.member_id {
            builder = builder.member_id(member_id);
        }
        for namespace in self.namespaces {
            builder = builder.namespace(namespace);
        }
        let conduit = builder.build()?;

        println!();
        println!(
            "  {} v{}",
            style("CONDUIT").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!("  Member     {}", style(conduit.member_id()).bold());
        println!(
            "  Namespaces {}",
            style(conduit.namespaces().join(", ")).cyan()
        );
        println!();

        // Blocks until shutdown
        conduit.run().await?;

        println!("\n  {}", style("Stopped.").dim());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        watch: WatchCommand,
    }

    #[test]
    fn test_watch_defaults() {
        let cmd = Harness::try_parse_from(["watch"]).unwrap().watch;
        assert_eq!(cmd.config, "conduit.toml");
        assert!(cmd.namespaces.is_empty());
        assert!(cmd.member_id.is_none());
    }

    #[test]
    fn test_watch_repeated_namespaces() {
        let cmd = Harness::try_parse_from([
            "watch",
            "-n",
            "orders",
            "--namespace",
            "billing",
            "--member-id",
            "node-a",
        ])
        .unwrap()
        .watch;
        assert_eq!(cmd.namespaces, vec!["orders", "billing"]);
        assert_eq!(cmd.member_id.as_deref(), Some("node-a"));
    }
}
