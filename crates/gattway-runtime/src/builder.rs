//! Peripheral Builder API
//!
//! Provides a builder-style API for consumers (hosts/bindings/tests) to
//! wire a platform into the engine and get command/event handles.

use std::sync::Arc;

use gattway_core::{
    create_command_channel, create_peripheral_event_channel, create_platform_event_channel,
    AdvertisingParams, CentralId, Command, CommandSender, GattwayError, PeripheralConfig,
    PeripheralEventReceiver, Platform, PlatformEventSender, ReplySender, Result, ServiceDef,
};
use tokio::{sync::oneshot, task::JoinHandle, time::Duration};
use tracing::{info, warn};

use crate::logic::PeripheralTask;

// ----------------------------------------------------------------------------
// Peripheral Builder
// ----------------------------------------------------------------------------

/// Builder for creating a peripheral engine bound to a platform.
pub struct PeripheralBuilder {
    platform: Arc<dyn Platform>,
    config: PeripheralConfig,
}

impl PeripheralBuilder {
    /// Create a new peripheral builder for the given platform.
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            config: PeripheralConfig::default(),
        }
    }

    /// Set the peripheral configuration.
    pub fn with_config(mut self, config: PeripheralConfig) -> Self {
        self.config = config;
        self
    }

    /// Build and start the peripheral engine.
    pub async fn build_and_start(self) -> Result<PeripheralHandle> {
        info!("Building peripheral engine");

        let channel_config = self.config.channels.clone();
        let (command_sender, command_receiver) = create_command_channel(&channel_config);
        let (platform_event_sender, platform_event_receiver) =
            create_platform_event_channel(&channel_config);
        let (event_sender, event_receiver) = create_peripheral_event_channel(&channel_config);

        let mut task = PeripheralTask::new(
            self.platform,
            self.config,
            command_receiver,
            platform_event_receiver,
            event_sender,
        );

        let task_handle = tokio::spawn(async move { task.run().await });

        info!("Peripheral engine started");

        Ok(PeripheralHandle {
            command_sender,
            platform_event_sender,
            event_receiver: Some(event_receiver),
            task_handle: Some(task_handle),
            running: true,
        })
    }
}

// ----------------------------------------------------------------------------
// Peripheral Handle
// ----------------------------------------------------------------------------

/// Handle to a running peripheral engine.
pub struct PeripheralHandle {
    command_sender: CommandSender,
    platform_event_sender: PlatformEventSender,
    event_receiver: Option<PeripheralEventReceiver>,
    task_handle: Option<JoinHandle<Result<()>>>,
    running: bool,
}

impl PeripheralHandle {
    /// Get a command sender for sending commands to the engine.
    pub fn command_sender(&self) -> CommandSender {
        self.command_sender.clone()
    }

    /// Get the sender a platform binding uses to report events.
    pub fn platform_event_sender(&self) -> PlatformEventSender {
        self.platform_event_sender.clone()
    }

    /// Take the peripheral event receiver (can only be called once).
    pub fn take_event_receiver(&mut self) -> Option<PeripheralEventReceiver> {
        self.event_receiver.take()
    }

    /// Send a command to the engine.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        self.command_sender
            .send(command)
            .await
            .map_err(|_| GattwayError::channel("Failed to send command to peripheral task"))
    }

    /// Initialize the platform binding.
    pub async fn initialize(&self) -> Result<()> {
        self.request(|reply| Command::Initialize { reply }).await
    }

    /// Check whether the platform supports the peripheral role.
    pub async fn is_supported(&self) -> Result<bool> {
        self.request(|reply| Command::IsSupported { reply }).await
    }

    /// Check whether the peripheral is currently advertising.
    pub async fn is_advertising(&self) -> Result<bool> {
        self.request(|reply| Command::IsAdvertising { reply }).await
    }

    /// Ask the platform for the permissions the peripheral role needs.
    pub async fn ask_permission(&self) -> Result<bool> {
        self.request(|reply| Command::AskPermission { reply }).await
    }

    /// Register a GATT service.
    pub async fn add_service(&self, definition: ServiceDef) -> Result<()> {
        self.request(|reply| Command::AddService { definition, reply })
            .await
    }

    /// Remove a registered GATT service.
    pub async fn remove_service(&self, uuid: impl Into<String>) -> Result<()> {
        let uuid = uuid.into();
        self.request(|reply| Command::RemoveService { uuid, reply })
            .await
    }

    /// Remove every registered GATT service.
    pub async fn clear_services(&self) -> Result<()> {
        self.request(|reply| Command::ClearServices { reply }).await
    }

    /// List registered service identifiers in registration order.
    pub async fn get_services(&self) -> Result<Vec<String>> {
        self.request(|reply| Command::GetServices { reply }).await
    }

    /// List centrals holding at least one subscription.
    pub async fn get_subscribed_clients(&self) -> Result<Vec<CentralId>> {
        self.request(|reply| Command::GetSubscribedClients { reply })
            .await
    }

    /// Start advertising with the given parameters.
    pub async fn start_advertising(&self, params: AdvertisingParams) -> Result<()> {
        self.request(|reply| Command::StartAdvertising { params, reply })
            .await
    }

    /// Stop advertising.
    pub async fn stop_advertising(&self) -> Result<()> {
        self.request(|reply| Command::StopAdvertising { reply })
            .await
    }

    /// Queue a characteristic value update for subscribers (or one target).
    pub async fn update_characteristic(
        &self,
        characteristic: impl Into<String>,
        payload: Vec<u8>,
        target: Option<CentralId>,
    ) -> Result<()> {
        let characteristic = characteristic.into();
        self.request(|reply| Command::UpdateCharacteristic {
            characteristic,
            payload,
            target,
            reply,
        })
        .await
    }

    /// Check if the engine is still running.
    pub fn is_running(&self) -> bool {
        self.running
            && self
                .task_handle
                .as_ref()
                .is_some_and(|h| !h.is_finished())
    }

    /// Wait for the engine to complete.
    pub async fn wait(&mut self) -> Result<()> {
        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(GattwayError::channel(format!(
                    "Peripheral task panicked: {}",
                    e
                ))),
            }
        } else {
            Ok(())
        }
    }

    /// Shutdown the engine gracefully.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down peripheral engine");

        // Send shutdown command
        let _ = self.send_command(Command::Shutdown).await;

        // Wait for the task to complete, aborting if it hangs
        if let Some(mut handle) = self.task_handle.take() {
            if tokio::time::timeout(Duration::from_secs(10), &mut handle)
                .await
                .is_err()
            {
                warn!("Peripheral task did not stop in time, aborting");
                handle.abort();
            }
        }

        self.running = false;
        info!("Peripheral engine shut down");
        Ok(())
    }

    /// Send a command carrying a reply channel and await the answer.
    async fn request<T>(&self, make: impl FnOnce(ReplySender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send_command(make(reply)).await?;
        response
            .await
            .map_err(|_| GattwayError::channel("Peripheral task dropped the reply channel"))?
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Create an engine with default configuration for testing.
pub async fn create_test_peripheral(platform: Arc<dyn Platform>) -> Result<PeripheralHandle> {
    PeripheralBuilder::new(platform)
        .with_config(PeripheralConfig::testing())
        .build_and_start()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use gattway_harness::MockPlatform;

    #[tokio::test]
    async fn test_peripheral_builder() {
        let platform = Arc::new(MockPlatform::new());

        let mut handle = PeripheralBuilder::new(platform)
            .with_config(PeripheralConfig::testing())
            .build_and_start()
            .await
            .expect("Failed to build peripheral");

        assert!(handle.is_running());

        // Round-trip a query through the task
        let supported = handle.is_supported().await.expect("Failed to query support");
        assert!(supported);

        handle.shutdown().await.expect("Failed to shutdown");
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_event_receiver_taken_once() {
        let platform = Arc::new(MockPlatform::new());

        let mut handle = create_test_peripheral(platform)
            .await
            .expect("Failed to create peripheral");

        let _events = handle
            .take_event_receiver()
            .expect("Failed to get event receiver");

        // Should only be able to take once
        assert!(handle.take_event_receiver().is_none());

        handle.shutdown().await.expect("Failed to shutdown");
    }

    #[tokio::test]
    async fn test_queries_reflect_engine_state() {
        let platform = Arc::new(MockPlatform::new());

        let mut handle = create_test_peripheral(platform)
            .await
            .expect("Failed to create peripheral");

        assert!(!handle.is_advertising().await.expect("query failed"));
        assert!(handle.get_services().await.expect("query failed").is_empty());
        assert!(handle
            .get_subscribed_clients()
            .await
            .expect("query failed")
            .is_empty());

        handle.shutdown().await.expect("Failed to shutdown");
    }
}
