use std::any::TypeId;
use std::collections::BTreeMap;

use super::service::{ClusterService, ClusterServiceBinding};

/// Picks one cluster service out of a candidate set.
///
/// Implementations must be pure: the result depends only on the candidates
/// and the selector's own parameters.
pub trait ClusterServiceSelector: Send + Sync {
    fn select(&self, services: &[ClusterService]) -> Option<ClusterService>;
}

impl<F> ClusterServiceSelector for F
where
    F: Fn(&[ClusterService]) -> Option<ClusterService> + Send + Sync,
{
    fn select(&self, services: &[ClusterService]) -> Option<ClusterService> {
        self(services)
    }
}

/// Built-in selection policies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    /// Exactly one candidate, otherwise nothing.
    #[default]
    Single,
    /// The first candidate in iteration order.
    First,
    /// The first candidate whose binding is of the given type.
    OfType {
        type_id: TypeId,
        type_name: &'static str,
    },
    /// The first candidate with `key` set to `value`.
    Attribute { key: String, value: String },
    /// The candidate with the lowest order; a tie selects nothing.
    Order,
}

/// Selector used when the caller does not provide one.
pub fn default_selector() -> Selector {
    Selector::Single
}

pub fn single() -> Selector {
    Selector::Single
}

pub fn first() -> Selector {
    Selector::First
}

pub fn of_type<T: ClusterServiceBinding>() -> Selector {
    Selector::OfType {
        type_id: TypeId::of::<T>(),
        type_name: std::any::type_name::<T>(),
    }
}

pub fn attribute(key: impl Into<String>, value: impl Into<String>) -> Selector {
    Selector::Attribute {
        key: key.into(),
        value: value.into(),
    }
}

pub fn order() -> Selector {
    Selector::Order
}

impl ClusterServiceSelector for Selector {
    fn select(&self, services: &[ClusterService]) -> Option<ClusterService> {
        match self {
            Selector::Single => select_single(services),
            Selector::First => services.first().cloned(),
            Selector::OfType { type_id, .. } => services
                .iter()
                .find(|s| s.binding_type_id() == *type_id)
                .cloned(),
            Selector::Attribute { key, value } => services
                .iter()
                .find(|s| s.attribute(key).as_deref() == Some(value.as_str()))
                .cloned(),
            Selector::Order => select_lowest_order(services),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Single => write!(f, "single"),
            Selector::First => write!(f, "first"),
            Selector::OfType { type_name, .. } => write!(f, "type({})", type_name),
            Selector::Attribute { key, value } => write!(f, "attribute({}={})", key, value),
            Selector::Order => write!(f, "order"),
        }
    }
}

fn select_single(services: &[ClusterService]) -> Option<ClusterService> {
    match services {
        [only] => Some(only.clone()),
        [] => None,
        _ => {
            tracing::debug!(
                items = ?ids(services),
                "Multiple cluster services available, single selector matches none"
            );
            None
        }
    }
}

fn select_lowest_order(services: &[ClusterService]) -> Option<ClusterService> {
    let mut by_order: BTreeMap<i32, Vec<&ClusterService>> = BTreeMap::new();
    for service in services {
        by_order.entry(service.order()).or_default().push(service);
    }

    let (order, candidates) = by_order.into_iter().next()?;
    match candidates.as_slice() {
        [only] => Some((*only).clone()),
        _ => {
            tracing::warn!(
                order,
                items = ?candidates.iter().map(|s| s.id()).collect::<Vec<_>>(),
                "Multiple cluster services share the highest priority"
            );
            None
        }
    }
}

fn ids(services: &[ClusterService]) -> Vec<&str> {
    services.iter().map(|s| s.id()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterViewBinding;
    use crate::error::Result;
    use crate::testing::MockClusterService;

    struct OtherBinding;

    impl ClusterServiceBinding for OtherBinding {
        fn kind(&self) -> &'static str {
            "other"
        }

        fn create_view(&self, _: &str, _: &str) -> Result<Box<dyn ClusterViewBinding>> {
            unreachable!("selector tests never acquire views")
        }
    }

    fn mock(id: &str) -> ClusterService {
        ClusterService::new(id, MockClusterService::new())
    }

    fn ids_of(service: Option<ClusterService>) -> Option<String> {
        service.map(|s| s.id().to_string())
    }

    #[test]
    fn test_single() {
        let a = mock("a");
        assert_eq!(ids_of(single().select(&[a.clone()])), Some("a".into()));
        assert!(single().select(&[]).is_none());
        assert!(single().select(&[a, mock("b")]).is_none());
    }

    #[test]
    fn test_first_keeps_input_order() {
        let services = [mock("b"), mock("a")];
        assert_eq!(ids_of(first().select(&services)), Some("b".into()));
        assert!(first().select(&[]).is_none());
    }

    #[test]
    fn test_of_type() {
        let services = [
            mock("m1"),
            ClusterService::new("o1", OtherBinding),
            ClusterService::new("o2", OtherBinding),
        ];

        assert_eq!(
            ids_of(of_type::<OtherBinding>().select(&services)),
            Some("o1".into())
        );
        assert_eq!(
            ids_of(of_type::<MockClusterService>().select(&services)),
            Some("m1".into())
        );
        assert!(of_type::<OtherBinding>().select(&services[..1]).is_none());
    }

    #[test]
    fn test_attribute() {
        let services = [
            mock("a").with_attribute("zone", "us"),
            mock("b").with_attribute("zone", "eu"),
            mock("c").with_attribute("zone", "eu"),
        ];

        assert_eq!(
            ids_of(attribute("zone", "eu").select(&services)),
            Some("b".into())
        );
        assert!(attribute("zone", "ap").select(&services).is_none());
        assert!(attribute("rack", "eu").select(&services).is_none());
    }

    #[test]
    fn test_order_picks_lowest() {
        let services = [mock("a").with_order(1), mock("b").with_order(0)];
        assert_eq!(ids_of(order().select(&services)), Some("b".into()));
    }

    #[test]
    fn test_order_tie_is_ambiguous() {
        let services = [
            mock("a").with_order(0),
            mock("b").with_order(0),
            mock("c").with_order(5),
        ];
        assert!(order().select(&services).is_none());
        assert!(order().select(&[]).is_none());
    }

    #[test]
    fn test_closure_selector() {
        let by_prefix = |services: &[ClusterService]| {
            services.iter().find(|s| s.id().starts_with("pri")).cloned()
        };
        let services = [mock("secondary"), mock("primary")];
        assert_eq!(ids_of(by_prefix.select(&services)), Some("primary".into()));
    }

    #[test]
    fn test_selectors_are_reusable_across_threads() {
        let selector = order();
        let services = vec![mock("a").with_order(2), mock("b").with_order(1)];

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    assert_eq!(ids_of(selector.select(&services)), Some("b".into()));
                });
            }
        });
    }

    #[test]
    fn test_display() {
        assert_eq!(single().to_string(), "single");
        assert_eq!(attribute("k", "v").to_string(), "attribute(k=v)");
        assert_eq!(default_selector(), Selector::Single);
    }
}
