//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every subscribed batch stops acquiring permits
//!               → pending / retrying requests complete as Cancelled
//!
//! Signals (signals.rs):
//!     SIGINT → shutdown.trigger()
//! ```
//!
//! # Design Decisions
//! - Cancellation is cooperative; in-flight calls finish or time out
//! - The signal is sticky, so late subscribers observe it too

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::spawn_signal_handler;
