//! Terminal failure taxonomy for logical requests.

use thiserror::Error;

use crate::transport::TransportError;

/// Why a logical request ended without a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport failure that is not worth retrying.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Non-2xx status outside the retryable set.
    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    /// 2xx response whose payload could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The API answered with an error envelope.
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    /// Every allowed attempt failed transiently.
    #[error("retries exhausted after {attempts} attempts (last: {last})")]
    RetriesExhausted { attempts: u32, last: String },

    /// The batch was cancelled before this request finished.
    #[error("cancelled")]
    Cancelled,

    /// The attempt panicked inside the transport or a payload inspector.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Stable short label, used for metrics and sink output.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::HttpStatus { .. } => "http_status",
            FetchError::MalformedResponse(_) => "malformed_response",
            FetchError::Api { .. } => "api",
            FetchError::RetriesExhausted { .. } => "retries_exhausted",
            FetchError::Cancelled => "cancelled",
            FetchError::Internal(_) => "internal",
        }
    }
}
