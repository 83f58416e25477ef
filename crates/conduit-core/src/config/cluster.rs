use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::selector::{self, Selector};
use crate::cluster::DEFAULT_ORDER;
use crate::error::{ConduitError, Result};

/// Cluster configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClusterConfig {
    /// Namespaces the node participates in.
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Cluster services to register.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    /// How to pick one service when several are registered.
    #[serde(default)]
    pub selector: SelectorConfig,
}

impl ClusterConfig {
    /// Check every service entry and the selector.
    pub fn validate(&self) -> Result<()> {
        for service in &self.services {
            service.validate()?;
        }
        self.selector.to_selector()?;
        Ok(())
    }
}

/// Cluster binding implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Single process; the local member leads every started namespace.
    #[default]
    Local,

    /// Lease files in a shared directory.
    File,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::File => "file",
        }
    }
}

/// One cluster service entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service id. Generated when absent.
    pub id: Option<String>,

    /// Binding implementation.
    #[serde(default)]
    pub kind: ServiceKind,

    /// Priority for the `order` selector; lower wins.
    #[serde(default = "default_order")]
    pub order: i32,

    /// Free-form metadata for the `attribute` selector.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Lock directory (file kind only).
    pub root: Option<PathBuf>,

    /// Delay before the first attempt to acquire a lease, in milliseconds.
    #[serde(default = "default_acquire_lock_delay")]
    pub acquire_lock_delay_ms: u64,

    /// Interval between lease checks, in milliseconds.
    #[serde(default = "default_acquire_lock_interval")]
    pub acquire_lock_interval_ms: u64,

    /// How long a lease stays valid without refresh, in milliseconds.
    #[serde(default = "default_lease_duration")]
    pub lease_duration_ms: u64,
}

impl ServiceConfig {
    /// A local service with defaults.
    pub fn local() -> Self {
        Self::with_kind(ServiceKind::Local)
    }

    /// A file service rooted at `root` with defaults.
    pub fn file(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::with_kind(ServiceKind::File)
        }
    }

    fn with_kind(kind: ServiceKind) -> Self {
        Self {
            id: None,
            kind,
            order: default_order(),
            attributes: BTreeMap::new(),
            root: None,
            acquire_lock_delay_ms: default_acquire_lock_delay(),
            acquire_lock_interval_ms: default_acquire_lock_interval(),
            lease_duration_ms: default_lease_duration(),
        }
    }

    pub fn acquire_lock_delay(&self) -> Duration {
        Duration::from_millis(self.acquire_lock_delay_ms)
    }

    pub fn acquire_lock_interval(&self) -> Duration {
        Duration::from_millis(self.acquire_lock_interval_ms)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(ConduitError::Config(
                    "cluster service id must not be blank".to_string(),
                ));
            }
        }

        if self.kind == ServiceKind::File {
            if self.root.is_none() {
                return Err(ConduitError::Config(
                    "file cluster service requires 'root'".to_string(),
                ));
            }
            if self.acquire_lock_interval_ms == 0 {
                return Err(ConduitError::Config(
                    "acquire_lock_interval_ms must be greater than zero".to_string(),
                ));
            }
            if self.lease_duration_ms <= self.acquire_lock_interval_ms {
                return Err(ConduitError::Config(
                    "lease_duration_ms must exceed acquire_lock_interval_ms".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn default_order() -> i32 {
    DEFAULT_ORDER
}

fn default_acquire_lock_delay() -> u64 {
    1000
}

fn default_acquire_lock_interval() -> u64 {
    10_000
}

fn default_lease_duration() -> u64 {
    30_000
}

/// Selection policy name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectorPolicy {
    #[default]
    Single,
    First,
    Order,
    Attribute,
}

/// Selector configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SelectorConfig {
    #[serde(default)]
    pub policy: SelectorPolicy,

    /// Attribute key (attribute policy only).
    pub key: Option<String>,

    /// Attribute value (attribute policy only).
    pub value: Option<String>,
}

impl SelectorConfig {
    pub fn to_selector(&self) -> Result<Selector> {
        match self.policy {
            SelectorPolicy::Single => Ok(selector::single()),
            SelectorPolicy::First => Ok(selector::first()),
            SelectorPolicy::Order => Ok(selector::order()),
            SelectorPolicy::Attribute => match (&self.key, &self.value) {
                (Some(key), Some(value)) => Ok(selector::attribute(key.clone(), value.clone())),
                _ => Err(ConduitError::Config(
                    "attribute selector requires 'key' and 'value'".to_string(),
                )),
            },
        }
    }
}
