//! Lookup of a cluster service among the services registered in a process.

use super::registry::ClusterServiceSource;
use super::selector::{default_selector, ClusterServiceSelector};
use super::service::ClusterService;
use crate::error::{ConduitError, Result};

/// Find the only registered cluster service.
pub fn lookup_service<S>(source: &S) -> Option<ClusterService>
where
    S: ClusterServiceSource + ?Sized,
{
    lookup_service_with(source, &default_selector())
}

/// Find a registered cluster service using `selector`.
pub fn lookup_service_with<S, Sel>(source: &S, selector: &Sel) -> Option<ClusterService>
where
    S: ClusterServiceSource + ?Sized,
    Sel: ClusterServiceSelector + ?Sized,
{
    let services = source.cluster_services();
    let selected = selector.select(&services);
    match &selected {
        Some(service) => tracing::debug!(
            candidates = services.len(),
            "Selected cluster service {}",
            service
        ),
        None => tracing::debug!(
            candidates = services.len(),
            "No cluster service selected"
        ),
    }
    selected
}

/// Like [`lookup_service`], failing with `InvalidState` when nothing matches.
pub fn mandatory_lookup_service<S>(source: &S) -> Result<ClusterService>
where
    S: ClusterServiceSource + ?Sized,
{
    mandatory_lookup_service_with(source, &default_selector())
}

/// Like [`lookup_service_with`], failing with `InvalidState` when nothing matches.
pub fn mandatory_lookup_service_with<S, Sel>(source: &S, selector: &Sel) -> Result<ClusterService>
where
    S: ClusterServiceSource + ?Sized,
    Sel: ClusterServiceSelector + ?Sized,
{
    lookup_service_with(source, selector)
        .ok_or_else(|| ConduitError::InvalidState("cluster service not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::registry::ClusterServiceRegistry;
    use crate::cluster::selector::{attribute, order, Selector};
    use crate::testing::MockClusterService;

    fn mock(id: &str) -> ClusterService {
        ClusterService::new(id, MockClusterService::new())
    }

    #[test]
    fn test_mandatory_lookup_on_empty_registry_fails() {
        let registry = ClusterServiceRegistry::new();
        let result = mandatory_lookup_service(&registry);
        crate::assert_err_variant!(result, ConduitError::InvalidState(_));
    }

    #[test]
    fn test_mandatory_lookup_with_single_service() {
        let registry = ClusterServiceRegistry::new();
        registry.register("main", mock("svc-1")).unwrap();

        let service = mandatory_lookup_service(&registry).unwrap();
        assert_eq!(service.id(), "svc-1");
    }

    #[test]
    fn test_default_lookup_is_single() {
        let registry = ClusterServiceRegistry::new();
        registry.register("a", mock("svc-a")).unwrap();
        registry.register("b", mock("svc-b")).unwrap();

        assert!(lookup_service(&registry).is_none());
        assert!(mandatory_lookup_service(&registry).is_err());
    }

    #[test]
    fn test_lookup_with_selector() {
        let registry = ClusterServiceRegistry::new();
        registry
            .register("a", mock("svc-a").with_order(2).with_attribute("env", "prod"))
            .unwrap();
        registry.register("b", mock("svc-b").with_order(1)).unwrap();

        let by_order = lookup_service_with(&registry, &order()).unwrap();
        assert_eq!(by_order.id(), "svc-b");

        let by_attr = mandatory_lookup_service_with(&registry, &attribute("env", "prod")).unwrap();
        assert_eq!(by_attr.id(), "svc-a");

        assert!(mandatory_lookup_service_with(&registry, &attribute("env", "dev")).is_err());
    }

    #[test]
    fn test_lookup_over_plain_slice_and_dyn_selector() {
        let services = vec![mock("svc-a"), mock("svc-b")];
        let selector: Box<dyn ClusterServiceSelector> = Box::new(Selector::First);

        let service = lookup_service_with(services.as_slice(), selector.as_ref()).unwrap();
        assert_eq!(service.id(), "svc-a");
    }
}
