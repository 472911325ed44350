//! Error types for the log shipper

use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, ShipperError>;

#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// The flush scheduler was started twice
    #[error("Log shipper is already running")]
    AlreadyRunning,

    /// Stop requested on a shipper that was never started
    #[error("Log shipper is not running")]
    NotRunning,

    /// `start` was called outside of a tokio runtime
    #[error("No tokio runtime available to host the flush scheduler")]
    NoRuntime,

    /// The request never produced an HTTP response
    #[error("Transport error: {message}")]
    Transport { message: String, transient: bool },

    /// The endpoint answered with a non-success status
    #[error("Webhook returned unexpected status {status}")]
    UnexpectedStatus { status: StatusCode },

    /// A drain cycle failed or panicked inside the background task
    #[error("Background flush fault: {0}")]
    BackgroundFault(String),
}

impl ShipperError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        ShipperError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        ShipperError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a transport error that is worth retrying
    pub fn transient(message: impl Into<String>) -> Self {
        ShipperError::Transport {
            message: message.into(),
            transient: true,
        }
    }

    /// Create a transport error that retrying cannot fix
    pub fn permanent(message: impl Into<String>) -> Self {
        ShipperError::Transport {
            message: message.into(),
            transient: false,
        }
    }

    /// Create a background fault
    pub fn background<S: Into<String>>(msg: S) -> Self {
        ShipperError::BackgroundFault(msg.into())
    }

    /// Whether another delivery attempt could succeed
    ///
    /// Every non-success status is retried except 429, which is handled as a
    /// throttling signal before it ever becomes an error.
    pub fn is_transient(&self) -> bool {
        match self {
            ShipperError::Transport { transient, .. } => *transient,
            ShipperError::UnexpectedStatus { status } => *status != StatusCode::TOO_MANY_REQUESTS,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ShipperError {
    fn from(err: reqwest::Error) -> Self {
        // Builder and redirect-policy failures repeat identically on every attempt.
        let transient = !(err.is_builder() || err.is_redirect());
        ShipperError::Transport {
            message: err.to_string(),
            transient,
        }
    }
}
