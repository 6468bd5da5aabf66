//! Channel configuration

use std::time::Duration;

use crate::constants::MAX_COMMAND_DATA;

/// Default pause after dropping the field before the next exchange
pub const DEFAULT_FIELD_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Configuration for a CIPURSE channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Largest command data length accepted by `exchange`
    pub max_command_data: usize,
    /// Pause after dropping the field
    pub field_settle_delay: Duration,
    /// Log every APDU at debug level instead of trace
    pub log_apdus: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_command_data: MAX_COMMAND_DATA,
            field_settle_delay: DEFAULT_FIELD_SETTLE_DELAY,
            log_apdus: false,
        }
    }
}

impl ChannelConfig {
    /// Set the largest command data length
    pub const fn with_max_command_data(mut self, max: usize) -> Self {
        self.max_command_data = max;
        self
    }

    /// Set the pause after dropping the field
    pub const fn with_field_settle_delay(mut self, delay: Duration) -> Self {
        self.field_settle_delay = delay;
        self
    }

    /// Enable or disable APDU logging at debug level
    pub const fn with_apdu_logging(mut self, enabled: bool) -> Self {
        self.log_apdus = enabled;
        self
    }
}
