//! Configuration for the peripheral engine

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the engine's bounded channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Buffer size for command channels (host → peripheral task)
    pub command_buffer_size: usize,
    /// Buffer size for platform event channels (binding → peripheral task)
    pub platform_event_buffer_size: usize,
    /// Buffer size for peripheral event channels (peripheral task → host)
    pub peripheral_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,          // Host commands are infrequent
            platform_event_buffer_size: 128,  // Platform callbacks can be bursty
            peripheral_event_buffer_size: 64, // Host callbacks need responsiveness
        }
    }
}

impl ChannelConfig {
    /// Create configuration with generous buffers for testing
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 100,
            platform_event_buffer_size: 100,
            peripheral_event_buffer_size: 100,
        }
    }
}

// ----------------------------------------------------------------------------
// Reconnect Policy
// ----------------------------------------------------------------------------

/// What to do at the platform level when a connected central drops
///
/// Platform bindings disagree about this: some stacks transparently accept the
/// central back, others need an explicit connect call. The engine makes it a
/// policy instead of hardcoding either behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReconnectPolicy {
    /// Leave the central disconnected until it connects again on its own
    #[default]
    Never,
    /// Issue a platform-level connect immediately after teardown
    Reconnect,
}

// ----------------------------------------------------------------------------
// Peripheral Configuration
// ----------------------------------------------------------------------------

/// Top-level configuration for a peripheral instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PeripheralConfig {
    /// Channel buffer sizes
    pub channels: ChannelConfig,
    /// Reconnect behavior on central disconnect
    pub reconnect: ReconnectPolicy,
}

impl PeripheralConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            channels: ChannelConfig::testing(),
            reconnect: ReconnectPolicy::Never,
        }
    }

    /// Set the channel configuration
    pub fn with_channels(mut self, channels: ChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    /// Set the reconnect policy
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_never() {
        let config = PeripheralConfig::default();
        assert_eq!(config.reconnect, ReconnectPolicy::Never);
    }

    #[test]
    fn test_builder_methods() {
        let config = PeripheralConfig::new()
            .with_channels(ChannelConfig::testing())
            .with_reconnect(ReconnectPolicy::Reconnect);

        assert_eq!(config.channels.command_buffer_size, 100);
        assert_eq!(config.reconnect, ReconnectPolicy::Reconnect);
    }
}
