//! Reconnection backoff policy
//!
//! Exponential backoff clamped to a ceiling, with a fixed attempt budget
//! per failure episode.

use crate::config::OrchestratorConfig;
use std::time::Duration;

/// Reconnection policy configuration
///
/// Controls how reconnection attempts are spaced when a peer connection fails.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectionPolicy {
    /// Maximum number of reconnection attempts (default: 5)
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds (default: 1000ms)
    pub backoff_initial_ms: u64,
    /// Maximum backoff delay in milliseconds (default: 30000ms)
    pub backoff_max_ms: u64,
    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for ReconnectionPolicy {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            max_retries: config.max_reconnect_attempts,
            backoff_initial_ms: config.reconnect_delay_ms,
            backoff_max_ms: config.max_reconnect_delay_ms,
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

impl ReconnectionPolicy {
    /// Calculate backoff duration for a given attempt number
    ///
    /// # Arguments
    /// * `attempt` - Attempts already made in this episode (0-indexed)
    ///
    /// # Returns
    /// `min(initial * multiplier^attempt, max)`
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let backoff_ms = (self.backoff_initial_ms as f64) * self.backoff_multiplier.powi(exponent);

        // powi overflows to +inf for large attempts; min() clamps that too
        let backoff_ms = backoff_ms.min(self.backoff_max_ms as f64);

        Duration::from_millis(backoff_ms as u64)
    }

    /// Check if more retries are allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}
