/// OTA configuration that can be tested independently
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Lower bound on the restart delay, so the success response is flushed
/// before the device goes down
pub const MIN_RESTART_DELAY_MS: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OtaConfig {
    /// Path the update handler is registered at
    pub post_path: String,
    /// Scratch buffer size, also the largest chunk written to flash at once
    pub buffer_size: usize,
    /// Wait per receive call before it counts as a timeout
    pub receive_timeout_ms: u32,
    pub max_consecutive_timeouts: u32,
    pub restart_delay_ms: u32,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            post_path: "/ota/update".to_string(),
            buffer_size: 4096,
            receive_timeout_ms: 5000,
            max_consecutive_timeouts: 5,
            restart_delay_ms: 1000,
        }
    }
}

impl OtaConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms as u64)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms as u64)
    }

    /// Receive timeout rounded up to whole seconds, never zero. For sockets
    /// whose wait timeout has second resolution (ESP-IDF httpd).
    pub fn receive_timeout_secs(&self) -> u64 {
        (self.receive_timeout_ms as u64).div_ceil(1000).max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.receive_timeout_ms == 0 {
            return Err(ConfigError::ZeroReceiveTimeout);
        }
        if !self.post_path.starts_with('/') {
            return Err(ConfigError::PostPath(self.post_path.clone()));
        }
        if self.restart_delay_ms < MIN_RESTART_DELAY_MS {
            return Err(ConfigError::RestartDelayTooShort {
                delay_ms: self.restart_delay_ms,
                min_ms: MIN_RESTART_DELAY_MS,
            });
        }
        Ok(())
    }
}
