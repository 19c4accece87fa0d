//! Crate-wide extraction error type.
//!
//! Every fallible step of the pipeline funnels into [`ExtractError`] so the
//! orchestrator can make retry decisions on the variant alone.

/// Result alias used throughout the extraction core
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Errors raised by the extraction pipeline
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request deadline exceeded after {0}s")]
    Deadline(u64),

    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed_json: {0}")]
    Malformed(String),

    #[error("validation failed: {0} error(s) remain")]
    Validation(usize),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("missing quarter/year: not in filename '{0}' nor in pass 1 metadata")]
    MissingPeriod(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("canceled by operator")]
    Canceled,
}

impl ExtractError {
    /// Transient errors are retried by the orchestrator with exponential
    /// backoff; everything else fails the PDF immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Deadline(_) | Self::RateLimited(_)
        )
    }
}
