//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! Target (url + query)
//!     → Transport::execute (one exchange, bounded by a timeout)
//!     → Exchange { status, body, retry_after, elapsed } | TransportError
//! ```
//!
//! # Design Decisions
//! - No retry and no rate awareness here; both live above the transport
//! - Timeouts are a distinct error, never folded into an HTTP status
//! - The trait is the seam tests replace with scripted fakes

pub mod http;
pub mod target;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpTransport;
pub use target::Target;

/// A completed request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub status: u16,
    pub body: Vec<u8>,
    /// Raw `Retry-After` header value, if the server sent one.
    pub retry_after: Option<String>,
    pub elapsed: Duration,
}

impl Exchange {
    pub fn new(status: u16, body: impl Into<Vec<u8>>, elapsed: Duration) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
            elapsed,
        }
    }

    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors below the HTTP status level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response within the per-call deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Connection refused, reset or DNS failure.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The response body could not be read completely.
    #[error("failed to read body: {0}")]
    Body(String),

    /// The request could not be built from the target.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

impl TransportError {
    /// Whether repeating the same request can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::InvalidTarget(_))
    }
}

/// Executes a single HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(&self, target: &Target) -> Result<Exchange, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn execute(&self, target: &Target) -> Result<Exchange, TransportError> {
        (**self).execute(target).await
    }
}
