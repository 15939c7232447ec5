//! OS signal handling.
//!
//! The first Ctrl-C triggers cooperative cancellation; in-flight requests
//! finish and everything else is reported as cancelled. A second Ctrl-C
//! exits immediately.

use crate::lifecycle::Shutdown;

/// Spawn a task translating Ctrl-C into `shutdown.trigger()`.
pub fn spawn_signal_handler(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            return;
        }
        tracing::warn!("Interrupt received, cancelling outstanding requests");
        shutdown.trigger();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Second interrupt, exiting");
            std::process::exit(130);
        }
    })
}
