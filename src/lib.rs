//! Adaptive rate-limited fetch engine for the WoT Blitz public API.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod governor;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod sink;
pub mod transport;
pub mod wg;

pub use config::schema::EngineConfig;
pub use dispatch::{Batch, Completion, Dispatcher};
pub use error::FetchError;
pub use governor::{Governor, Permit, Signal};
pub use lifecycle::Shutdown;
pub use transport::{Exchange, HttpTransport, Target, Transport, TransportError};
