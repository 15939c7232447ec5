//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! relations. All violations are collected, not just the first.

use thiserror::Error;

use crate::config::schema::EngineConfig;

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a configuration, returning every violation found.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let g = &config.governor;

    if !(g.min_rate.is_finite() && g.min_rate > 0.0) {
        errors.push(ValidationError::new("governor.min_rate", "must be a positive number"));
    }
    if !(g.max_rate.is_finite() && g.max_rate > 0.0) {
        errors.push(ValidationError::new("governor.max_rate", "must be a positive number"));
    }
    if g.min_rate > g.max_rate {
        errors.push(ValidationError::new(
            "governor.min_rate",
            format!("{} exceeds max_rate {}", g.min_rate, g.max_rate),
        ));
    }
    if !g.initial_rate.is_finite() || g.initial_rate <= 0.0 {
        errors.push(ValidationError::new("governor.initial_rate", "must be a positive number"));
    }
    if g.max_concurrency == 0 {
        errors.push(ValidationError::new("governor.max_concurrency", "must be at least 1"));
    }
    if !(g.burst >= 1.0) {
        errors.push(ValidationError::new("governor.burst", "must be at least 1.0"));
    }
    if g.clean_threshold == 0 {
        errors.push(ValidationError::new("governor.clean_threshold", "must be at least 1"));
    }
    if !(g.increase_factor > 1.0) {
        errors.push(ValidationError::new("governor.increase_factor", "must be greater than 1.0"));
    }
    if !(g.decrease_factor > 0.0 && g.decrease_factor < 1.0) {
        errors.push(ValidationError::new(
            "governor.decrease_factor",
            "must be between 0.0 and 1.0 (exclusive)",
        ));
    }

    let r = &config.retry;
    if r.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be at least 1"));
    }
    if !(r.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::new("retry.backoff_multiplier", "must be at least 1.0"));
    }
    if r.max_backoff_ms < r.base_backoff_ms {
        errors.push(ValidationError::new(
            "retry.max_backoff_ms",
            "must not be smaller than base_backoff_ms",
        ));
    }
    if !(0.0..=1.0).contains(&r.jitter) {
        errors.push(ValidationError::new("retry.jitter", "must be within 0.0..=1.0"));
    }
    for code in r.retryable_status_codes.iter().chain(&r.throttle_status_codes) {
        if !(100..=599).contains(code) {
            errors.push(ValidationError::new(
                "retry.status_codes",
                format!("{} is not an HTTP status", code),
            ));
        }
    }
    if let Some(code) = r.retryable_status_codes.iter().find(|c| (200..300).contains(*c)) {
        errors.push(ValidationError::new(
            "retry.retryable_status_codes",
            format!("success status {} cannot be retried", code),
        ));
    }

    if config.transport.timeout_ms == 0 {
        errors.push(ValidationError::new("transport.timeout_ms", "must be greater than 0"));
    }

    if config.dispatch.output_buffer == 0 {
        errors.push(ValidationError::new("dispatch.output_buffer", "must be at least 1"));
    }
    if config.dispatch.max_outstanding < g.max_concurrency {
        errors.push(ValidationError::new(
            "dispatch.max_outstanding",
            "must not be smaller than governor.max_concurrency",
        ));
    }

    if !(config.api.rate_limit.is_finite() && config.api.rate_limit > 0.0) {
        errors.push(ValidationError::new("api.rate_limit", "must be a positive number"));
    }
    if config.api.ru_rate_limit == 0.0 {
        errors.push(ValidationError::new(
            "api.ru_rate_limit",
            "must be positive, or negative to reuse rate_limit",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
