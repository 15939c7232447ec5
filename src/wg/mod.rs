//! WoT Blitz public API adapter.
//!
//! # Data Flow
//! ```text
//! account IDs
//!     → region.rs (which cluster owns the ID)
//!     → api.rs (Target per endpoint, per region)
//!     → Dispatcher
//!     → envelope.rs (2xx body: ok / throttled / API error)
//! ```
//!
//! # Design Decisions
//! - One governor per region; the clusters enforce separate limits
//! - API errors arrive as HTTP 200, so they are classified from the body

pub mod api;
pub mod envelope;
pub mod region;

use thiserror::Error;

pub use api::{WgApi, DEFAULT_ACCOUNT_FIELDS, MAX_ACCOUNTS_PER_REQUEST};
pub use envelope::{ApiError, Envelope, EnvelopeInspector};
pub use region::Region;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WgError {
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    #[error("no API server for region {0}")]
    NoServer(Region),

    #[error("account {account_id} belongs to {actual}, not {expected}")]
    RegionMismatch {
        account_id: u64,
        expected: Region,
        actual: Region,
    },

    #[error("empty account ID list")]
    EmptyIds,

    #[error("{0} account IDs exceed the per-request limit")]
    TooManyIds(usize),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}
