//! Shutdown coordination.

use tokio_util::sync::CancellationToken;

/// Coordinator for cooperative cancellation.
///
/// Cloning shares the same signal. Batches subscribe with a child token, so
/// cancelling one batch never cancels its siblings, while triggering the
/// coordinator cancels them all.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once the signal has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }
}
