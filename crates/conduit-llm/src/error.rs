use thiserror::Error;

/// Errors that can occur while translating a request or consuming a response
#[derive(Debug, Error)]
pub enum LlmError {
    /// The request could not be translated (unknown role, unsupported part, unknown model)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream provider rejected the request or could not be reached
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Error while reading or decoding the chunk stream
    #[error("streaming error: {0}")]
    Streaming(String),

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// The caller-supplied deadline passed before the stream finished
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The model refused to answer
    #[error("refusal: {0}")]
    Refusal(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether this error reflects a transient provider issue
    ///
    /// Nothing inside this crate retries; callers use this to drive their own
    /// retry policy.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Streaming(_))
    }

    /// Whether this error came from the transport side of the request
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Upstream(_) | Self::Streaming(_) | Self::Cancelled | Self::DeadlineExceeded
        )
    }
}
