//! Conduit - cluster leadership for namespaces
//!
//! Loads cluster services from configuration, picks one with the configured
//! selector and follows leadership of a set of namespaces until shutdown.

mod runtime;

#[doc(hidden)]
pub use conduit_core;
pub use conduit_runtime;

#[cfg(feature = "testing")]
pub use conduit_core::{assert_err, assert_err_variant, assert_ok};

pub use runtime::prelude;
pub use runtime::{Conduit, ConduitBuilder};
