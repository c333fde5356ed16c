//! # Offline Common
//!
//! Error types and logging configuration shared by the offline worker crates.
//!
//! ## Features
//!
//! - Unified error type with backtrace support for unexpected failures
//! - Logging configuration and setup
//! - Result and Option extension traits

use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for the offline worker.
#[derive(Error, Debug)]
pub enum OfflineError {
    /// A network fetch failed or was rejected.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A cache store operation failed.
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration is missing or invalid.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The notification collaborator rejected a request.
    #[error("Notification error: {0}")]
    Notification(String),

    /// The client-window collaborator rejected a request.
    #[error("Client error: {0}")]
    Client(String),

    /// JSON (de)serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl OfflineError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error with backtrace.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Whether this error came from the network rather than local state.
    pub fn is_network(&self) -> bool {
        matches!(self, OfflineError::Network { .. })
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            OfflineError::Network { .. } => "network",
            OfflineError::Cache { .. } => "cache",
            OfflineError::Config { .. } => "config",
            OfflineError::Notification(_) => "notification",
            OfflineError::Client(_) => "client",
            OfflineError::Json(_) => "json",
            OfflineError::NotFound(_) => "not_found",
            OfflineError::InvalidArgument(_) => "invalid_argument",
            OfflineError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for offline worker operations.
pub type Result<T> = std::result::Result<T, OfflineError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| OfflineError::internal(format!("{}: {}", message.into(), e)))
    }
}

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| OfflineError::NotFound(resource.into()))
    }
}
