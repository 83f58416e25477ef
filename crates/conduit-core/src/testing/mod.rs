//! Testing utilities for cluster bindings and the code that consumes them.
//!
//! - [`MockClusterService`]: a scriptable binding that counts view creation,
//!   starts and stops per namespace and can inject failures.
//! - Assertion macros (`assert_ok!`, `assert_err!`, `assert_err_variant!`).
//!
//! # Example
//!
//! ```ignore
//! use conduit_core::cluster::ClusterService;
//! use conduit_core::testing::MockClusterService;
//!
//! #[test]
//! fn test_view_starts_with_service() {
//!     let mock = MockClusterService::new();
//!     let service = ClusterService::new("svc", mock.clone());
//!     let view = service.get_view("orders").unwrap();
//!
//!     service.start().unwrap();
//!     assert!(view.is_running());
//!     assert_eq!(mock.starts("orders"), 1);
//! }
//! ```

pub mod assertions;
pub mod mock_cluster;

pub use assertions::*;
pub use mock_cluster::{MockClusterService, MockViewBinding};

use std::time::Duration;

/// Default timeout for waiting on asynchronous bindings in tests.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10);
