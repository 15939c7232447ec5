//! Adaptive rate state.
//!
//! # State Transitions
//! ```text
//! Throttled: rate → max(rate × decrease_factor, min_rate), clean streak → 0
//! Clean:     clean streak + 1; at clean_threshold:
//!            rate → min(rate × increase_factor, max_rate), clean streak → 0
//! Neutral:   no change
//! ```

use crate::config::GovernorConfig;

/// Feedback reported when a permit is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The server answered normally.
    Clean,
    /// The server asked us to slow down (429/503 or equivalent).
    Throttled,
    /// Failure unrelated to load; only frees the slot.
    Neutral,
}

/// Snapshot of the governor's mutable state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateState {
    pub current_rate: f64,
    pub in_flight: usize,
    pub consecutive_throttle_signals: u32,
    pub consecutive_clean_responses: u32,
}

/// A rate adjustment caused by a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateChange {
    Decreased { from: f64, to: f64 },
    Increased { from: f64, to: f64 },
}

impl RateState {
    pub fn new(config: &GovernorConfig) -> Self {
        Self {
            current_rate: config.initial_rate.clamp(config.min_rate, config.max_rate),
            in_flight: 0,
            consecutive_throttle_signals: 0,
            consecutive_clean_responses: 0,
        }
    }

    /// Apply one release signal, returning the rate change it caused.
    pub fn apply(&mut self, signal: Signal, config: &GovernorConfig) -> Option<RateChange> {
        let from = self.current_rate;
        match signal {
            Signal::Throttled => {
                self.consecutive_clean_responses = 0;
                self.consecutive_throttle_signals = self.consecutive_throttle_signals.saturating_add(1);
                self.current_rate = (from * config.decrease_factor).max(config.min_rate);
                (self.current_rate < from).then_some(RateChange::Decreased {
                    from,
                    to: self.current_rate,
                })
            }
            Signal::Clean => {
                self.consecutive_throttle_signals = 0;
                self.consecutive_clean_responses += 1;
                if self.consecutive_clean_responses < config.clean_threshold {
                    return None;
                }
                self.consecutive_clean_responses = 0;
                self.current_rate = (from * config.increase_factor).min(config.max_rate);
                (self.current_rate > from).then_some(RateChange::Increased {
                    from,
                    to: self.current_rate,
                })
            }
            Signal::Neutral => None,
        }
    }

    /// True while sustained throttling keeps the rate pinned at its floor.
    pub fn should_alert_floor(&self, config: &GovernorConfig) -> bool {
        config.floor_alert_after > 0
            && self.current_rate <= config.min_rate
            && self.consecutive_throttle_signals > 0
            && self.consecutive_throttle_signals % config.floor_alert_after == 0
    }
}
