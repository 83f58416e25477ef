//! Cluster service abstraction for Conduit.
//!
//! A [`ClusterService`](cluster::ClusterService) hands out reference-counted
//! [`ClusterView`](cluster::ClusterView)s per namespace and reports
//! leadership and membership changes to registered listeners. Concrete
//! coordination technologies plug in through
//! [`ClusterServiceBinding`](cluster::ClusterServiceBinding) and
//! [`ClusterViewBinding`](cluster::ClusterViewBinding).

pub mod cluster;
pub mod config;
pub mod error;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cluster::{
    ClusterMember, ClusterService, ClusterServiceRegistry, ClusterView, Selector, ServiceStatus,
};
pub use config::ConduitConfig;
pub use error::{ConduitError, Result};
