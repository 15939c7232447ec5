//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → governor / retry policy / transport / dispatcher built from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation rejects any bound that would disable throttling

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ApiConfig, DispatchConfig, EngineConfig, GovernorConfig, ObservabilityConfig, RetryConfig,
    TransportConfig,
};
pub use validation::{validate_config, ValidationError};
