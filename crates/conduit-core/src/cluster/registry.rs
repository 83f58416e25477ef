use parking_lot::RwLock;

use super::service::ClusterService;
use crate::error::{ConduitError, Result};

/// Anything that can list the cluster services known to a process.
pub trait ClusterServiceSource {
    /// All services, in registration order.
    fn cluster_services(&self) -> Vec<ClusterService>;
}

impl ClusterServiceSource for [ClusterService] {
    fn cluster_services(&self) -> Vec<ClusterService> {
        self.to_vec()
    }
}

impl ClusterServiceSource for Vec<ClusterService> {
    fn cluster_services(&self) -> Vec<ClusterService> {
        self.clone()
    }
}

/// Named registry of cluster services for one application.
pub struct ClusterServiceRegistry {
    services: RwLock<Vec<(String, ClusterService)>>,
}

impl ClusterServiceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            services: RwLock::new(Vec::new()),
        }
    }

    /// Register a service under `name`. Names must be unique.
    pub fn register(&self, name: impl Into<String>, service: ClusterService) -> Result<()> {
        let name = name.into();
        let mut services = self.services.write();
        if services.iter().any(|(n, _)| *n == name) {
            return Err(ConduitError::InvalidArgument(format!(
                "cluster service '{}' is already registered",
                name
            )));
        }
        tracing::debug!(name = %name, service = %service, "Registered cluster service");
        services.push((name, service));
        Ok(())
    }

    /// Remove the service registered under `name`, returning it.
    pub fn unregister(&self, name: &str) -> Option<ClusterService> {
        let mut services = self.services.write();
        let position = services.iter().position(|(n, _)| n == name)?;
        Some(services.remove(position).1)
    }

    pub fn get(&self, name: &str) -> Option<ClusterService> {
        self.services
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.clone())
    }

    /// All services, in registration order.
    pub fn find_by_type(&self) -> Vec<ClusterService> {
        self.services.read().iter().map(|(_, s)| s.clone()).collect()
    }

    /// All services with their registration names, in registration order.
    pub fn find_by_type_with_name(&self) -> Vec<(String, ClusterService)> {
        self.services.read().clone()
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    /// Start every registered service in registration order. Stops at the
    /// first failure.
    pub fn start_all(&self) -> Result<()> {
        for (name, service) in self.find_by_type_with_name() {
            tracing::info!(
                "Using cluster service {} with id: {} and implementation: {}",
                name,
                service.id(),
                service.kind()
            );
            service.start()?;
        }
        Ok(())
    }

    /// Stop every registered service in reverse registration order. Every
    /// service is attempted; the first failure is returned.
    pub fn stop_all(&self) -> Result<()> {
        let mut first_error = None;
        for (name, service) in self.find_by_type_with_name().into_iter().rev() {
            if let Err(e) = service.stop() {
                tracing::warn!("Failed to stop cluster service {}: {}", name, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for ClusterServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterServiceSource for ClusterServiceRegistry {
    fn cluster_services(&self) -> Vec<ClusterService> {
        self.find_by_type()
    }
}
