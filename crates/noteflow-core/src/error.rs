//! Error types for noteflow.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using noteflow's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable provider error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    /// Request timed out.
    Timeout,
    /// Connection failed or was reset.
    Connection,
    /// Rate limit exceeded (HTTP 429).
    RateLimited,
    /// Upstream server error (HTTP 5xx).
    ServerError,
    /// Request rejected by the provider (non-retryable 4xx).
    BadRequest,
    /// Invalid authentication credentials (HTTP 401/403).
    Authentication,
    /// Unclassified failure.
    Unknown,
}

impl std::fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::BadRequest => "bad_request",
            Self::Authentication => "authentication",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Uniform provider failure carried across every backend.
///
/// Retryability policy: HTTP 5xx, 429, and 408 are retryable; other 4xx
/// are not; timeouts and connection resets are retryable.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
    pub retryable: bool,
    pub status_code: Option<u16>,
}

impl ProviderError {
    /// Classify an HTTP status into a provider error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let (code, retryable) = match status {
            408 => (ProviderErrorCode::Timeout, true),
            429 => (ProviderErrorCode::RateLimited, true),
            401 | 403 => (ProviderErrorCode::Authentication, false),
            400..=499 => (ProviderErrorCode::BadRequest, false),
            500..=599 => (ProviderErrorCode::ServerError, true),
            _ => (ProviderErrorCode::Unknown, false),
        };
        Self {
            code,
            message: message.into(),
            retryable,
            status_code: Some(status),
        }
    }

    /// A request timeout (always retryable).
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            code: ProviderErrorCode::Timeout,
            message: message.into(),
            retryable: true,
            status_code: None,
        }
    }

    /// A connection failure or reset (always retryable).
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            code: ProviderErrorCode::Connection,
            message: message.into(),
            retryable: true,
            status_code: None,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "{} ({}): {}", self.code, status, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Core error type for noteflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Bad or missing configuration (credentials, endpoints)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request rejected by provider-side validation before any network call
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Provider call failed
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Provider type not registered in the factory table
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Provider hot-swap rejected (candidate failed its health check)
    #[error("Provider switch failed: {0}")]
    ProviderSwitch(String),

    /// Failed job carries a job type with no registered executor
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    /// Failed job not found
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Listener subscription could not be established
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry of the failing operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Provider(e) => e.retryable,
            Error::Database(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
