use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SessionError;
use crate::upload::RetryPolicy;

/// Configuration for a recording session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Length of each segment before rotating
    /// Default: 300 000 ms (5 minutes)
    pub segment_threshold_ms: u64,

    /// Hard cap on the whole session; reaching it stops the session
    /// Default: 7 200 000 ms (2 hours)
    pub max_session_duration_ms: u64,

    /// Upload attempts per segment (including the first)
    pub max_retries: u32,

    /// Backoff unit between upload attempts
    pub retry_base_delay_ms: u64,

    /// Owner prefix for remote object paths
    pub owner_id: String,

    /// Elapsed-time tick while capturing
    pub tick_interval_ms: u64,

    /// Capture health poll while capturing
    pub health_poll_interval_ms: u64,

    /// Metering sample interval while capturing
    pub level_sample_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            segment_threshold_ms: 300_000,
            max_session_duration_ms: 7_200_000,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            owner_id: "local".to_string(),
            tick_interval_ms: 1_000,
            health_poll_interval_ms: 2_000,
            level_sample_interval_ms: 100,
        }
    }
}

impl SessionConfig {
    /// Reject settings that would rotate or stop without ever capturing
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.segment_threshold_ms == 0 {
            return Err(SessionError::InvalidConfig(
                "segment_threshold_ms must be positive".to_string(),
            ));
        }
        if self.max_session_duration_ms == 0 {
            return Err(SessionError::InvalidConfig(
                "max_session_duration_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_base_delay_ms)
    }

    pub(crate) fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub(crate) fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_interval_ms.max(1))
    }

    pub(crate) fn level_sample_interval(&self) -> Duration {
        Duration::from_millis(self.level_sample_interval_ms.max(1))
    }
}
