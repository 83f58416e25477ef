use anyhow::Result;
use clap::Parser;
use console::style;

use crate::runtime::Conduit;

/// List the configured cluster services.
#[derive(Parser)]
pub struct ServicesCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "conduit.toml")]
    pub config: String,
}

impl ServicesCommand {
    /// Execute the services command.
    pub async fn execute(self) -> Result<()> {
        let config = super::load_config(&self.config)?;
        super::init_tracing(&config.observability.logging);

        let policy = config.cluster.selector.to_selector()?;
        let conduit = Conduit::builder().config(config).build()?;
        let registry = conduit.build_registry()?;

        println!();
        for (name, service) in registry.find_by_type_with_name() {
            let attributes: Vec<String> = service
                .attributes()
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            println!(
                "  {} {} kind={} order={} {}",
                style(&name).bold(),
                style(format!("({})", service.id())).dim(),
                service.kind(),
                service.order(),
                attributes.join(" ")
            );
        }
        println!();

        match conduit.select_service(&registry) {
            Ok(service) => println!(
                "  Selector {} picks {}",
                style(&policy).cyan(),
                style(service.id()).bold().green()
            ),
            Err(_) => println!(
                "  Selector {} picks {}",
                style(&policy).cyan(),
                style("nothing").bold().red()
            ),
        }
        println!();

        Ok(())
    }
}
