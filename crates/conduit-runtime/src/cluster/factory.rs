use conduit_core::cluster::{ClusterService, ClusterServiceRegistry};
use conduit_core::config::{ClusterConfig, ServiceConfig, ServiceKind};
use conduit_core::Result;

use super::file_lock::{FileLockClusterService, FileLockConfig};
use super::local::LocalClusterService;

/// Build a stopped cluster service from one `[[cluster.services]]` entry.
///
/// `member_id` identifies this process inside every namespace; when absent
/// the service id is used.
pub fn build_service(config: &ServiceConfig, member_id: Option<&str>) -> Result<ClusterService> {
    config.validate()?;

    let id = config
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let service = match config.kind {
        ServiceKind::Local => {
            let mut binding = LocalClusterService::new();
            if let Some(member_id) = member_id {
                binding = binding.with_member_id(member_id);
            }
            ClusterService::new(id, binding)
        }
        ServiceKind::File => {
            let mut binding =
                FileLockClusterService::new(FileLockConfig::from_service_config(config)?)?;
            if let Some(member_id) = member_id {
                binding = binding.with_member_id(member_id);
            }
            ClusterService::new(id, binding)
        }
    };

    service.set_order(config.order);
    for (key, value) in &config.attributes {
        service.set_attribute(key, value);
    }

    tracing::debug!(
        id = %service.id(),
        kind = config.kind.as_str(),
        order = config.order,
        "Built cluster service"
    );

    Ok(service)
}

/// Build a registry holding every configured service, keyed by service id.
pub fn build_registry(config: &ClusterConfig, member_id: Option<&str>) -> Result<ClusterServiceRegistry> {
    let registry = ClusterServiceRegistry::new();
    for entry in &config.services {
        let service = build_service(entry, member_id)?;
        registry.register(service.id().to_string(), service)?;
    }
    Ok(registry)
}
