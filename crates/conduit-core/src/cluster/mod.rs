mod event;
mod helper;
mod member;
mod registry;
pub mod selector;
mod service;
mod status;
mod view;

pub use event::{ClusterEvent, ClusterEventListener, LeadershipListener, MembershipListener};
pub use helper::{
    lookup_service, lookup_service_with, mandatory_lookup_service, mandatory_lookup_service_with,
};
pub use member::ClusterMember;
pub use registry::{ClusterServiceRegistry, ClusterServiceSource};
pub use selector::{ClusterServiceSelector, Selector};
pub use service::{ClusterService, ClusterServiceBinding, DEFAULT_ORDER};
pub use status::ServiceStatus;
pub use view::{ClusterView, ClusterViewBinding, ViewNotifier};
