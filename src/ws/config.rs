#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Configuration for channel client behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for automatic reconnection behavior.
///
/// The scheduler uses a fixed delay between attempts. Attempts are counted
/// consecutively and reset to zero by every successful open, so a connection
/// that fails again later gets the full budget back.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnection attempts before giving up
    pub max_attempts: u32,
    /// Fixed delay between an abnormal closure and the next attempt
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}
