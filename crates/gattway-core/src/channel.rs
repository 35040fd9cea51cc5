//! Channel utilities for the peripheral engine
//!
//! All inter-task communication runs over bounded tokio mpsc channels created
//! here, sized by `ChannelConfig`.

use crate::config::ChannelConfig;
use crate::message::{Command, PeripheralEvent, PlatformEvent};

// ----------------------------------------------------------------------------
// Channel Type Aliases
// ----------------------------------------------------------------------------

pub type CommandSender = tokio::sync::mpsc::Sender<Command>;
pub type CommandReceiver = tokio::sync::mpsc::Receiver<Command>;
pub type PlatformEventSender = tokio::sync::mpsc::Sender<PlatformEvent>;
pub type PlatformEventReceiver = tokio::sync::mpsc::Receiver<PlatformEvent>;
pub type PeripheralEventSender = tokio::sync::mpsc::Sender<PeripheralEvent>;
pub type PeripheralEventReceiver = tokio::sync::mpsc::Receiver<PeripheralEvent>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create bounded command channel (host → peripheral task)
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    tokio::sync::mpsc::channel(config.command_buffer_size)
}

/// Create bounded platform event channel (platform binding → peripheral task)
pub fn create_platform_event_channel(
    config: &ChannelConfig,
) -> (PlatformEventSender, PlatformEventReceiver) {
    tokio::sync::mpsc::channel(config.platform_event_buffer_size)
}

/// Create bounded peripheral event channel (peripheral task → host)
pub fn create_peripheral_event_channel(
    config: &ChannelConfig,
) -> (PeripheralEventSender, PeripheralEventReceiver) {
    tokio::sync::mpsc::channel(config.peripheral_event_buffer_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.command_buffer_size, 32);
        assert_eq!(config.platform_event_buffer_size, 128);
        assert_eq!(config.peripheral_event_buffer_size, 64);
    }

    #[tokio::test]
    async fn test_platform_event_channel_creation() {
        let config = ChannelConfig::default();
        let (sender, mut receiver) = create_platform_event_channel(&config);

        sender.send(PlatformEvent::ReadyToUpdate).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received, PlatformEvent::ReadyToUpdate);
    }
}
