use thiserror::Error;

/// Core error type for Conduit operations.
#[derive(Error, Debug)]
pub enum ConduitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Failed to start view {namespace}: {reason}")]
    ViewStart { namespace: String, reason: String },

    #[error("Failed to stop view {namespace}: {reason}")]
    ViewStop { namespace: String, reason: String },

    #[error("Cluster binding error: {0}")]
    Binding(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConduitError {
    /// Wrap a failure raised while starting the view for `namespace`.
    pub fn view_start(namespace: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ConduitError::ViewStart {
            namespace: namespace.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap a failure raised while stopping the view for `namespace`.
    pub fn view_stop(namespace: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ConduitError::ViewStop {
            namespace: namespace.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias using ConduitError.
pub type Result<T> = std::result::Result<T, ConduitError>;
