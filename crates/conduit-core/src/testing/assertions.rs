//! Test assertion macros and helpers.
//!
//! Provides ergonomic assertion macros for cluster lifecycle tests.

use crate::cluster::{ClusterView, ServiceStatus};
use crate::error::ConduitError;

/// Assert that a result is Ok.
///
/// # Example
///
/// ```ignore
/// assert_ok!(service.start());
/// assert_ok!(service.start(), "service should start");
/// ```
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: expected Ok, got Err({:?})", e),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: {}: expected Ok, got Err({:?})", format_args!($($arg)+), e),
        }
    };
}

/// Assert that a result is Err.
///
/// # Example
///
/// ```ignore
/// assert_err!(service.get_view(""));
/// ```
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match &$expr {
            Err(_) => (),
            Ok(v) => panic!("assertion failed: expected Err, got Ok({:?})", v),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match &$expr {
            Err(_) => (),
            Ok(v) => panic!("assertion failed: {}: expected Err, got Ok({:?})", format_args!($($arg)+), v),
        }
    };
}

/// Assert that an error matches a specific variant.
///
/// # Example
///
/// ```ignore
/// assert_err_variant!(lookup, ConduitError::InvalidState(_));
/// ```
#[macro_export]
macro_rules! assert_err_variant {
    ($expr:expr, $variant:pat) => {
        match &$expr {
            Err($variant) => (),
            Err(e) => panic!(
                "assertion failed: expected {}, got {:?}",
                stringify!($variant),
                e
            ),
            Ok(v) => panic!(
                "assertion failed: expected Err({}), got Ok({:?})",
                stringify!($variant),
                v
            ),
        }
    };
}

/// Check if an error message contains a substring.
pub fn error_contains(error: &ConduitError, substring: &str) -> bool {
    error.to_string().contains(substring)
}

/// Panic unless the view reports the expected status.
pub fn assert_view_status(view: &ClusterView, expected: ServiceStatus) {
    assert_eq!(
        view.status(),
        expected,
        "view {} of service {} has unexpected status",
        view.namespace(),
        view.service_id()
    );
}

/// Wait until `condition` holds or `timeout` elapses. Returns the last result.
pub fn wait_for(timeout: std::time::Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
}
