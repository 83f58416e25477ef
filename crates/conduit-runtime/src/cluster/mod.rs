mod factory;
mod file_lock;
mod local;

pub use factory::{build_registry, build_service};
pub use file_lock::{FileLockClusterService, FileLockConfig, Lease};
pub use local::LocalClusterService;
