//! Cluster bindings for Conduit.
//!
//! Provides the `local` and `file` implementations of
//! [`ClusterServiceBinding`](conduit_core::cluster::ClusterServiceBinding)
//! and builds them from configuration.

pub mod cluster;

pub use cluster::{
    build_registry, build_service, FileLockClusterService, FileLockConfig, LocalClusterService,
};
