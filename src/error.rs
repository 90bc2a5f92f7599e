//! Error types for Pacer
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Pacer
#[derive(Debug, Error)]
pub enum PacerError {
    /// Operation requires a running monitor
    #[error("Capacity monitor is not active")]
    InactiveMonitor,

    /// Monitor was destroyed and cannot be restarted
    #[error("Capacity monitor has been destroyed")]
    Destroyed,

    /// `check_now` was called from a listener while this monitor is dispatching
    #[error("A capacity check is already in progress on this thread")]
    TickInProgress,

    /// Timer could not be armed because no tokio runtime is available
    #[error("No tokio runtime available to drive the monitor timer")]
    NoRuntime,

    /// Usage provider failed to answer
    #[error("Usage provider error: {0}")]
    Provider(String),

    /// Usage provider answered with data that cannot be evaluated
    #[error("Malformed usage: {0}")]
    MalformedUsage(String),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Pacer operations
pub type Result<T> = std::result::Result<T, PacerError>;
