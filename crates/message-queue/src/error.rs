//! Error types for queue operations.
//!
//! Errors fall into three families that the engine treats differently:
//!
//! - [`ConfigurationError`] is always fatal. It is surfaced to the caller and
//!   never handed to an error-action pipeline.
//! - [`DeliveryFailure`] is raised by a delivery strategy and routed through the
//!   interface's `on_error` pipeline.
//! - [`BackendError`] comes from a backend's transport or storage and propagates
//!   to the caller of `send`/`consume`. The engine does not retry backend calls.

use thiserror::Error;

/// Boxed error returned by user supplied handlers (tasks and callbacks).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryFailure),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Deferred consumer launch failed: {0}")]
    Launch(#[from] LaunchError),
}

impl QueueError {
    /// Configuration errors indicate a bug in the interface setup and must never
    /// be absorbed by error handling.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Validation(_))
    }

    /// Check if the error was raised by a delivery strategy
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, Self::Delivery(_))
    }

    /// Check if error is transient and the caller may retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Backend(e) => e.is_transient(),
            Self::Launch(_) => true,
            Self::Configuration(_)
            | Self::Delivery(_)
            | Self::Serialization(_)
            | Self::Validation(_) => false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("No configured interface matches queue '{queue}'")]
    NoMatchingInterface { queue: String },

    #[error("No interfaces are configured")]
    NoInterfaces,

    #[error("Unknown interface '{name}'")]
    UnknownInterface { name: String },

    #[error("Interface '{interface}' does not declare a backend")]
    MissingBackend { interface: String },

    #[error("Backend '{backend}' is not registered")]
    UnknownBackend { backend: String },

    #[error("Unsupported message encoding '{name}'")]
    UnsupportedEncoding { name: String },

    #[error("Invalid error action '{action}'")]
    UnknownAction { action: String },

    #[error("Error action '{action}' requires an argument")]
    MissingArgument { action: String },

    #[error("No {kind} handler registered under '{name}'")]
    UnknownHandler { kind: &'static str, name: String },

    #[error("Invalid queue pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        Self::Parsing {
            message: error.to_string(),
        }
    }
}

/// Failures raised while delivering a message.
///
/// These are the only errors the `on_error` pipeline reacts to.
#[derive(Debug, Error)]
pub enum DeliveryFailure {
    #[error("No delivery strategy applies to message from queue '{queue}'")]
    NoDeliveryStrategy { queue: String },

    #[error("Delivery callback '{handler}' failed: {source}")]
    Callback {
        handler: String,
        #[source]
        source: HandlerError,
    },

    #[error("Task '{task}' failed: {source}")]
    Task {
        task: String,
        #[source]
        source: HandlerError,
    },

    #[error("Task '{task}' is not registered")]
    UnknownTask { task: String },

    #[error("Requeue target '{queue}' could not be resolved: {source}")]
    RequeueTarget {
        queue: String,
        #[source]
        source: ConfigurationError,
    },

    #[error("Message from queue '{queue}' could not be decoded: {source}")]
    Undecodable {
        queue: String,
        #[source]
        source: SerializationError,
    },

    #[error("Error callback '{handler}' failed: {source}")]
    ErrorCallback {
        handler: String,
        #[source]
        source: HandlerError,
    },
}

/// Errors raised by backends while storing or transporting messages
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("I/O failure on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request to '{url}' failed: {message}")]
    Http { url: String, message: String },

    #[error("Remote endpoint rejected message: {response}")]
    Rejected { response: String },

    #[error("Stored message '{id}' is corrupt: {message}")]
    Corrupt { id: String, message: String },

    #[error("Backend '{backend}' is unavailable: {message}")]
    Unavailable { backend: String, message: String },
}

impl BackendError {
    /// Check if the failure is worth retrying by the caller
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io { .. } => true,
            Self::Http { .. } => true,
            Self::Unavailable { .. } => true,
            Self::Rejected { .. } => false,
            Self::Corrupt { .. } => false,
        }
    }
}

/// Errors during message body encoding/decoding
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Message body is not in encoded form (found {found} body)")]
    NotEncoded { found: &'static str },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

/// Errors raised when handing a deferred consumption pass to a launcher
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open consumer output file '{path}': {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Deferred worker is no longer accepting requests")]
    WorkerStopped,

    #[error("No consumer launcher is configured")]
    NotConfigured,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
