//! Bus configuration with validation.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of concurrent sends.
pub const DEFAULT_SEND_CONCURRENCY: usize = 2;

/// Default maximum size of one wire unit in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default pause between poll cycles.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

/// Runtime parameters of a [`crate::Bus`]. Fixed for the bus's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Pause between poll cycles in milliseconds
    pub poll_interval_ms: u64,
    /// Concurrent send operations
    pub send_concurrency: usize,
    /// Largest serialized message sent as one unit; larger ones are fragmented
    pub max_message_size: usize,
    /// How long `stop()` waits for the poll task before aborting it
    pub stop_timeout_ms: u64,
    /// Partial reassemblies older than this are evicted
    pub partial_ttl_secs: u64,
    /// Completed ids are remembered this long to drop redeliveries
    pub completed_ttl_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            send_concurrency: DEFAULT_SEND_CONCURRENCY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            stop_timeout_ms: 5_000,
            partial_ttl_secs: 24 * 60 * 60,
            completed_ttl_secs: 60 * 60,
        }
    }
}

impl BusConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Zero {
                field: "poll_interval_ms",
            });
        }
        if self.send_concurrency == 0 {
            return Err(ConfigError::Zero {
                field: "send_concurrency",
            });
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Zero {
                field: "max_message_size",
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    #[must_use]
    pub fn partial_ttl(&self) -> Duration {
        Duration::from_secs(self.partial_ttl_secs)
    }

    #[must_use]
    pub fn completed_ttl(&self) -> Duration {
        Duration::from_secs(self.completed_ttl_secs)
    }
}
