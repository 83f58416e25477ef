mod cluster;
mod observability;

pub use cluster::{ClusterConfig, SelectorConfig, SelectorPolicy, ServiceConfig, ServiceKind};
pub use observability::{LoggingConfig, ObservabilityConfig};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConduitError, Result};

/// Root configuration for Conduit.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConduitConfig {
    /// Node configuration.
    #[serde(default)]
    pub node: NodeConfig,

    /// Cluster configuration.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl ConduitConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConduitError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content)?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConduitError::Config(format!("Failed to parse config: {}", e)))?;
        config.cluster.validate()?;

        Ok(config)
    }
}

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfig {
    /// Node id, used as the local member id. Defaults to the host name.
    pub id: Option<String>,
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ConduitError::Internal(e.to_string()))?;

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    Ok(result)
}
