use thiserror::Error;

/// Application-wide error types for Trawl.
#[derive(Error, Debug)]
pub enum AppError {
    /// Upstream API answered with a non-success status.
    #[error("Upstream error (HTTP {status_code}): {message}")]
    Upstream {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// Upstream rejected our credentials even after a token refresh.
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// Response was missing expected fields or had an unexpected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The requested item no longer exists upstream.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Some records of a batch could not be written. Siblings were still attempted.
    #[error("Failed to persist {failed} of {attempted} records (first error: {first_error})")]
    PersistenceBatch {
        failed: usize,
        attempted: usize,
        first_error: String,
    },

    /// A queued payload could not be decoded into a crawl job.
    #[error("Invalid job payload: {0}")]
    InvalidJob(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and the job is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded
            | AppError::DatabaseError(_)
            | AppError::PersistenceBatch { .. } => true,
            AppError::Upstream { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns true if the handler should log this error and carry on with an empty page.
    pub fn is_malformed(&self) -> bool {
        matches!(self, AppError::MalformedResponse(_))
    }
}
