//! Error types for the kilowatch exporter

use std::time::Duration;

/// Result type alias using our error type
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the exporter
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection establishment to a device failed
    #[error("connection failed: {0}")]
    Connect(String),

    /// A connect, read, or whole-call deadline elapsed
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Device rejected the credentials (HTTP 401/403)
    #[error("authentication rejected (HTTP {status})")]
    Auth {
        /// HTTP status code returned by the device
        status: u16,
    },

    /// Unexpected HTTP status from a device
    #[error("unexpected HTTP {status}: {snippet}")]
    Status {
        /// HTTP status code returned by the device
        status: u16,
        /// Short body snippet for diagnostics
        snippet: String,
    },

    /// 2xx response whose body is not JSON by strict or lenient parse
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Configuration loading or validation error
    #[error("config error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Runtime error (binding, task management)
    #[error("runtime error: {0}")]
    Runtime(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error outside the device path
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the device client may retry the call after this error.
    ///
    /// Auth failures are retryable: transient auth-flow hiccups are seen in
    /// the wild on PDU firmware. They stay distinguishable via [`Error::kind`].
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Connect(_)
                | Error::Timeout(_)
                | Error::Auth { .. }
                | Error::Status { .. }
                | Error::MalformedPayload(_)
        )
    }

    /// Short stable tag for structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Connect(_) => "connect",
            Error::Timeout(_) => "timeout",
            Error::Auth { .. } => "auth",
            Error::Status { .. } => "status",
            Error::MalformedPayload(_) => "payload",
            Error::Config(_) => "config",
            Error::Metrics(_) => "metrics",
            Error::Runtime(_) => "runtime",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
        }
    }
}
