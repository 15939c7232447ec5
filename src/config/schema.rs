//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the fetch engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Rate and concurrency bounds.
    pub governor: GovernorConfig,

    /// Retry and backoff policy.
    pub retry: RetryConfig,

    /// Per-call HTTP settings.
    pub transport: TransportConfig,

    /// Queue and output buffering.
    pub dispatch: DispatchConfig,

    /// WoT Blitz API credentials and per-region ceilings.
    pub api: ApiConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Adaptive rate governor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Floor for the adaptive rate (requests per second).
    pub min_rate: f64,

    /// Ceiling for the adaptive rate (requests per second).
    pub max_rate: f64,

    /// Starting rate. Clamped into `[min_rate, max_rate]`.
    pub initial_rate: f64,

    /// Maximum concurrently held permits.
    pub max_concurrency: usize,

    /// Token bucket capacity (burst tolerance in requests).
    pub burst: f64,

    /// Consecutive clean responses before the rate is raised.
    pub clean_threshold: u32,

    /// Multiplicative step applied on increase (> 1.0).
    pub increase_factor: f64,

    /// Multiplicative step applied on a throttle signal (0.0 < x < 1.0).
    pub decrease_factor: f64,

    /// Consecutive throttle signals at the floor before alerting.
    pub floor_alert_after: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            min_rate: 1.0,
            max_rate: 20.0,
            initial_rate: 10.0,
            max_concurrency: 32,
            burst: 1.0,
            clean_threshold: 20,
            increase_factor: 1.1,
            decrease_factor: 0.5,
            floor_alert_after: 10,
        }
    }
}

impl GovernorConfig {
    /// Lowest rate a governor will run at, in requests per second.
    pub const RATE_FLOOR: f64 = 0.01;

    /// Pull out-of-range values back to the nearest usable setting.
    ///
    /// Returns the names of the fields that were changed. Loaded configs are
    /// rejected by `validate_config` instead; this covers hand-built ones.
    pub fn sanitize(&mut self) -> Vec<&'static str> {
        let mut changed = Vec::new();

        let min_rate = finite_or(self.min_rate, Self::RATE_FLOOR).max(Self::RATE_FLOOR);
        let max_rate = finite_or(self.max_rate, min_rate).max(min_rate);
        let initial_rate = finite_or(self.initial_rate, max_rate).clamp(min_rate, max_rate);
        let burst = finite_or(self.burst, 1.0).max(1.0);
        let increase_factor = if self.increase_factor > 1.0 && self.increase_factor.is_finite() {
            self.increase_factor
        } else {
            Self::default().increase_factor
        };
        let decrease_factor = if self.decrease_factor > 0.0 && self.decrease_factor < 1.0 {
            self.decrease_factor
        } else {
            Self::default().decrease_factor
        };

        adjust(&mut self.min_rate, min_rate, "min_rate", &mut changed);
        adjust(&mut self.max_rate, max_rate, "max_rate", &mut changed);
        adjust(&mut self.initial_rate, initial_rate, "initial_rate", &mut changed);
        adjust(&mut self.burst, burst, "burst", &mut changed);
        adjust(&mut self.increase_factor, increase_factor, "increase_factor", &mut changed);
        adjust(&mut self.decrease_factor, decrease_factor, "decrease_factor", &mut changed);
        let max_concurrency = self.max_concurrency.max(1);
        adjust(&mut self.max_concurrency, max_concurrency, "max_concurrency", &mut changed);
        let clean_threshold = self.clean_threshold.max(1);
        adjust(&mut self.clean_threshold, clean_threshold, "clean_threshold", &mut changed);

        changed
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn adjust<T: PartialEq + Copy>(field: &mut T, value: T, name: &'static str, changed: &mut Vec<&'static str>) {
    if *field != value {
        *field = value;
        changed.push(name);
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub base_backoff_ms: u64,

    /// Growth factor between consecutive retries.
    pub backoff_multiplier: f64,

    /// Upper bound for any single delay in milliseconds.
    pub max_backoff_ms: u64,

    /// Random jitter added to each delay, as a fraction of it.
    pub jitter: f64,

    /// HTTP statuses that are retried.
    pub retryable_status_codes: BTreeSet<u16>,

    /// HTTP statuses reported to the governor as throttling.
    pub throttle_status_codes: BTreeSet<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 250,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
            jitter: 0.1,
            retryable_status_codes: [429, 500, 502, 503, 504].into_iter().collect(),
            throttle_status_codes: [429, 503].into_iter().collect(),
        }
    }
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Total time allowed for one request/response exchange.
    pub timeout_ms: u64,

    /// Connection establishment timeout.
    pub connect_timeout_ms: u64,

    /// User-Agent header sent with every request.
    pub user_agent: String,

    /// Request compressed (gzip or deflate) responses.
    pub gzip: bool,
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            user_agent: concat!("blitz-fetch/", env!("CARGO_PKG_VERSION")).to_string(),
            gzip: true,
        }
    }
}

/// Dispatcher queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum admitted-but-unfinished requests per batch (in flight plus backing off).
    pub max_outstanding: usize,

    /// Capacity of the completion channel handed to the caller.
    pub output_buffer: usize,

    /// Skip a key already seen earlier in the batch. Remembering every key
    /// costs memory linear in the batch size; when off, only keys that are
    /// still outstanding are skipped.
    pub reject_duplicate_keys: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_outstanding: 256,
            output_buffer: 128,
            reject_duplicate_keys: true,
        }
    }
}

/// WoT Blitz API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Application ID for the EU, NA and Asia servers.
    pub app_id: String,

    /// Application ID for the RU server.
    pub ru_app_id: String,

    /// Rate ceiling (requests per second) for EU, NA and Asia.
    pub rate_limit: f64,

    /// Rate ceiling for RU. Negative means "same as `rate_limit`".
    pub ru_rate_limit: f64,
}

impl ApiConfig {
    /// Effective RU ceiling.
    pub fn effective_ru_rate_limit(&self) -> f64 {
        if self.ru_rate_limit < 0.0 {
            self.rate_limit
        } else {
            self.ru_rate_limit
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            ru_app_id: String::new(),
            rate_limit: 10.0,
            ru_rate_limit: -1.0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
