//! Peripheral task implementation.
//!
//! Contains the main PeripheralTask struct, its select loop, and the command
//! and platform event handlers.

use std::sync::Arc;

use gattway_core::{
    parse_ble_uuid, Advertisement, AdvertisingParams, BondState, CentralId, Command,
    CommandReceiver, GattwayError, PeripheralConfig, PeripheralEvent, PeripheralEventSender,
    Platform, PlatformEvent, PlatformEventReceiver, ReadResponse, ReconnectPolicy, RequestId,
    RequestStatus, Result, SendOutcome, ServiceDef, WriteResponse, CCCD_UUID,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::state::{EngineStats, PeripheralState};
use crate::managers::{BondAction, ConnectAction, StartAction};

// ----------------------------------------------------------------------------
// Peripheral Task
// ----------------------------------------------------------------------------

/// The peripheral task that processes all commands and platform events.
pub struct PeripheralTask {
    /// Engine state (registry, subscriptions, queue, connections, advertising).
    state: PeripheralState,
    /// Injected platform capability.
    platform: Arc<dyn Platform>,
    /// Engine configuration.
    config: PeripheralConfig,
    /// Channel for receiving commands from the host.
    command_receiver: CommandReceiver,
    /// Channel for receiving events from the platform binding.
    platform_event_receiver: PlatformEventReceiver,
    /// Channel for delivering events to the host.
    event_sender: PeripheralEventSender,
    /// Whether the task should continue running.
    running: bool,
}

impl PeripheralTask {
    /// Create a new peripheral task.
    pub fn new(
        platform: Arc<dyn Platform>,
        config: PeripheralConfig,
        command_receiver: CommandReceiver,
        platform_event_receiver: PlatformEventReceiver,
        event_sender: PeripheralEventSender,
    ) -> Self {
        Self {
            state: PeripheralState::new(),
            platform,
            config,
            command_receiver,
            platform_event_receiver,
            event_sender,
            running: true,
        }
    }

    /// Run the main peripheral task loop.
    pub async fn run(&mut self) -> Result<()> {
        info!("Peripheral task starting");

        while self.running {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => {
                            if let Err(e) = self.process_command(command).await {
                                match e {
                                    // Unrecoverable errors: shut down the task
                                    GattwayError::Channel { .. } => {
                                        error!("Unrecoverable error processing command, shutting down peripheral task: {}", e);
                                        self.running = false;
                                        break;
                                    }
                                    // Central-specific errors: log and continue
                                    GattwayError::DeviceNotFound { central } => {
                                        warn!("Central {} not found. Dropping command.", central);
                                    }
                                    // Log other errors and continue
                                    _ => {
                                        error!("Error processing command: {}", e);
                                    }
                                }
                            }
                        }
                        None => {
                            info!("Command channel closed, shutting down");
                            break;
                        }
                    }
                }

                event = self.platform_event_receiver.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(e) = self.process_platform_event(event).await {
                                match e {
                                    // Unrecoverable errors: shut down the task
                                    GattwayError::Channel { .. } => {
                                        error!("Unrecoverable error processing platform event, shutting down peripheral task: {}", e);
                                        self.running = false;
                                        break;
                                    }
                                    // Central-specific errors: log and continue
                                    GattwayError::DeviceNotFound { central } => {
                                        warn!("Central {} not found. Dropping event.", central);
                                    }
                                    // Log other errors and continue
                                    _ => {
                                        error!("Error processing platform event: {}", e);
                                    }
                                }
                            }
                        }
                        None => {
                            // Without the binding there is nothing left to serve.
                            warn!("Platform event channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        info!("Peripheral task stopped");
        Ok(())
    }

    /// Stop the peripheral task.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Get current statistics.
    pub fn stats(&self) -> &EngineStats {
        &self.state.stats
    }

    // ------------------------------------------------------------------------
    // Command processing
    // ------------------------------------------------------------------------

    /// Process a command from the host, answering through its reply channel.
    async fn process_command(&mut self, command: Command) -> Result<()> {
        self.state.stats.commands_processed += 1;

        match command {
            Command::Initialize { reply } => {
                let _ = reply.send(self.platform.initialize().await);
            }
            Command::IsSupported { reply } => {
                let _ = reply.send(self.platform.is_supported().await);
            }
            Command::IsAdvertising { reply } => {
                let _ = reply.send(Ok(self.state.advertising.is_advertising()));
            }
            Command::AskPermission { reply } => {
                let _ = reply.send(self.platform.ask_permission().await);
            }
            Command::AddService { definition, reply } => {
                let _ = reply.send(self.handle_add_service(definition).await);
            }
            Command::RemoveService { uuid, reply } => {
                let (result, events) = self.handle_remove_service(&uuid).await;
                let _ = reply.send(result);
                for event in events {
                    self.emit(event).await?;
                }
            }
            Command::ClearServices { reply } => {
                let (result, events) = self.handle_clear_services().await;
                let _ = reply.send(result);
                for event in events {
                    self.emit(event).await?;
                }
            }
            Command::GetServices { reply } => {
                let _ = reply.send(Ok(self.state.registry.service_uuids()));
            }
            Command::GetSubscribedClients { reply } => {
                let _ = reply.send(Ok(self.state.subscriptions.subscribed_centrals()));
            }
            Command::StartAdvertising { params, reply } => {
                let (result, events) = self.handle_start_advertising(params).await;
                let _ = reply.send(result);
                for event in events {
                    self.emit(event).await?;
                }
            }
            Command::StopAdvertising { reply } => {
                let (result, events) = self.handle_stop_advertising().await;
                let _ = reply.send(result);
                for event in events {
                    self.emit(event).await?;
                }
            }
            Command::UpdateCharacteristic {
                characteristic,
                payload,
                target,
                reply,
            } => {
                // Reply before draining: enqueueing never blocks the caller
                // on platform sends.
                let _ = reply.send(self.handle_update_characteristic(
                    &characteristic,
                    payload,
                    target,
                ));
                self.drain_updates().await;
            }
            Command::Shutdown => {
                info!("Shutdown command received");
                self.running = false;
            }
        }

        Ok(())
    }

    async fn handle_add_service(&mut self, definition: ServiceDef) -> Result<()> {
        let service = self.state.registry.add_service(definition)?;
        if let Err(e) = self.platform.add_service(&service).await {
            // The platform refused synchronously; keep the registry truthful.
            self.state.registry.remove_service(&service.uuid);
            return Err(e);
        }
        self.state.registry.mark_pending_add(service.uuid);
        Ok(())
    }

    async fn handle_remove_service(&mut self, uuid: &str) -> (Result<()>, Vec<PeripheralEvent>) {
        let uuid = match parse_ble_uuid(uuid) {
            Ok(uuid) => uuid,
            Err(e) => return (Err(e), Vec::new()),
        };
        if self.state.registry.remove_service(&uuid).is_none() {
            debug!("Ignoring removal of unknown service {}", uuid);
            return (Ok(()), Vec::new());
        }
        let result = self.platform.remove_service(uuid).await;
        // Removing an unconfirmed service can resolve the last pending add.
        let events = self.release_parked_if_ready().await;
        (result, events)
    }

    async fn handle_clear_services(&mut self) -> (Result<()>, Vec<PeripheralEvent>) {
        let removed = self.state.registry.clear();
        debug!("Cleared {} service(s)", removed);
        let result = self.platform.clear_services().await;
        let events = self.release_parked_if_ready().await;
        (result, events)
    }

    async fn handle_start_advertising(
        &mut self,
        params: AdvertisingParams,
    ) -> (Result<()>, Vec<PeripheralEvent>) {
        let advertisement = match build_advertisement(params) {
            Ok(advertisement) => advertisement,
            Err(e) => return (Err(e), Vec::new()),
        };

        let defer = self.state.registry.has_pending_adds();
        match self.state.advertising.request_start(advertisement, defer) {
            Ok(StartAction::Dispatch(advertisement)) => {
                match self.platform.start_advertising(&advertisement).await {
                    Ok(()) => (Ok(()), Vec::new()),
                    Err(e) => {
                        self.state.advertising.mark_failed(e.to_string());
                        let events = vec![PeripheralEvent::AdvertisingStatusChanged {
                            advertising: false,
                            error: Some(e.to_string()),
                        }];
                        (Err(e), events)
                    }
                }
            }
            Ok(StartAction::Deferred) => (Ok(()), Vec::new()),
            Err(e) => (Err(e), Vec::new()),
        }
    }

    async fn handle_stop_advertising(&mut self) -> (Result<()>, Vec<PeripheralEvent>) {
        let was_active = self.state.advertising.request_stop();
        let result = self.platform.stop_advertising().await;
        if let Err(ref e) = result {
            warn!("Platform stop_advertising failed: {}", e);
        }
        debug!("Advertising stopped (was_active: {})", was_active);
        // Stop always announces advertising=false, once per command.
        let events = vec![PeripheralEvent::AdvertisingStatusChanged {
            advertising: false,
            error: None,
        }];
        (result, events)
    }

    fn handle_update_characteristic(
        &mut self,
        characteristic: &str,
        payload: Vec<u8>,
        target: Option<CentralId>,
    ) -> Result<()> {
        let uuid = parse_ble_uuid(characteristic)?;
        if self.state.registry.find_characteristic(&uuid).is_none() {
            return Err(GattwayError::not_found(characteristic));
        }
        if let Some(central) = &target {
            if !self.state.connections.is_connected(central) {
                return Err(GattwayError::device_not_found(central.as_str()));
            }
        }
        self.state.registry.update_cached_value(&uuid, &payload)?;
        debug!(
            "Queued update for {} ({} bytes): {}",
            uuid,
            payload.len(),
            hex::encode(&payload)
        );
        self.state.queue.enqueue(uuid, payload, target);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Platform event processing
    // ------------------------------------------------------------------------

    /// Process an event from the platform binding, forwarding the resulting
    /// host events.
    async fn process_platform_event(&mut self, event: PlatformEvent) -> Result<()> {
        self.state.stats.events_processed += 1;

        let events = match event {
            PlatformEvent::AdapterStateChanged { powered } => {
                info!("Adapter powered: {}", powered);
                vec![PeripheralEvent::StateChanged { powered }]
            }
            PlatformEvent::AdvertisingStarted { error } => match error {
                Some(reason) => {
                    warn!("Advertising failed to start: {}", reason);
                    self.state.advertising.mark_failed(reason.clone());
                    vec![PeripheralEvent::AdvertisingStatusChanged {
                        advertising: false,
                        error: Some(reason),
                    }]
                }
                None => {
                    info!("Advertising started");
                    self.state.advertising.mark_started();
                    vec![PeripheralEvent::AdvertisingStatusChanged {
                        advertising: true,
                        error: None,
                    }]
                }
            },
            PlatformEvent::AdvertisingStopped => {
                if self.state.advertising.on_stopped_by_platform() {
                    info!("Advertising stopped by platform");
                    vec![PeripheralEvent::AdvertisingStatusChanged {
                        advertising: false,
                        error: None,
                    }]
                } else {
                    Vec::new()
                }
            }
            PlatformEvent::ServiceAdded { uuid, error } => {
                self.handle_service_added(uuid, error).await
            }
            PlatformEvent::CentralConnected {
                central,
                bond_state,
            } => self.handle_central_connected(central, bond_state).await,
            PlatformEvent::CentralDisconnected { central } => {
                self.handle_central_disconnected(central).await
            }
            PlatformEvent::BondStateChanged { central, state } => {
                self.handle_bond_state_changed(central, state).await
            }
            PlatformEvent::MtuChanged { central, mtu } => {
                self.state.connections.set_mtu(&central, mtu);
                vec![PeripheralEvent::MtuChanged { central, mtu }]
            }
            PlatformEvent::ReadRequested {
                request,
                central,
                characteristic,
                offset,
            } => {
                self.handle_read_requested(request, central, characteristic, offset)
                    .await
            }
            PlatformEvent::WriteRequested {
                request,
                central,
                characteristic,
                offset,
                value,
            } => {
                self.handle_write_requested(request, central, characteristic, offset, value)
                    .await
            }
            PlatformEvent::DescriptorReadRequested {
                request,
                central,
                characteristic,
                descriptor,
            } => {
                self.handle_descriptor_read(request, central, characteristic, descriptor)
                    .await
            }
            PlatformEvent::DescriptorWriteRequested {
                request,
                central,
                characteristic,
                descriptor,
                value,
            } => {
                self.handle_descriptor_write(request, central, characteristic, descriptor, value)
                    .await
            }
            PlatformEvent::ReadyToUpdate => {
                self.state.queue.unblock();
                self.drain_updates().await;
                Vec::new()
            }
        };

        for event in events {
            self.emit(event).await?;
        }

        Ok(())
    }

    async fn handle_service_added(
        &mut self,
        uuid: String,
        error: Option<String>,
    ) -> Vec<PeripheralEvent> {
        let parsed = match parse_ble_uuid(&uuid) {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Platform confirmed unparseable service identifier {:?}", uuid);
                return Vec::new();
            }
        };

        if !self.state.registry.confirm_add(&parsed) {
            debug!("Service {} confirmed without a pending marker", parsed);
        }
        if error.is_some() {
            // The native stack rejected the service; drop it so the registry
            // reflects what the GATT server actually hosts.
            self.state.registry.remove_service(&parsed);
        }

        let mut events = vec![PeripheralEvent::ServiceAdded {
            service: parsed.to_string(),
            error,
        }];
        events.extend(self.release_parked_if_ready().await);
        events
    }

    /// Dispatch a parked advertisement once no service add is pending.
    ///
    /// Every path that empties the pending-add set goes through here:
    /// platform confirmations, service removal, and clear-services. A parked
    /// start left behind would wedge the controller in `Starting`.
    async fn release_parked_if_ready(&mut self) -> Vec<PeripheralEvent> {
        if self.state.registry.has_pending_adds() {
            return Vec::new();
        }
        let Some(advertisement) = self.state.advertising.take_parked() else {
            return Vec::new();
        };
        info!("Pending service adds resolved, dispatching parked advertisement");
        if let Err(e) = self.platform.start_advertising(&advertisement).await {
            self.state.advertising.mark_failed(e.to_string());
            return vec![PeripheralEvent::AdvertisingStatusChanged {
                advertising: false,
                error: Some(e.to_string()),
            }];
        }
        Vec::new()
    }

    async fn handle_central_connected(
        &mut self,
        central: CentralId,
        bond_state: BondState,
    ) -> Vec<PeripheralEvent> {
        match self
            .state
            .connections
            .on_central_connected(&central, bond_state)
        {
            ConnectAction::Connected => {
                if let Err(e) = self.platform.connect(&central).await {
                    warn!("Platform connect for {} failed: {}", central, e);
                }
                vec![PeripheralEvent::ConnectionStateChanged {
                    central,
                    connected: true,
                }]
            }
            ConnectAction::AwaitBond { request_bond } => {
                if request_bond {
                    if let Err(e) = self.platform.request_bond(&central).await {
                        warn!("Bond request for {} failed: {}", central, e);
                    }
                }
                Vec::new()
            }
            ConnectAction::None => Vec::new(),
        }
    }

    async fn handle_central_disconnected(&mut self, central: CentralId) -> Vec<PeripheralEvent> {
        // Teardown order: subscription removals are announced before the
        // connection state change.
        let mut events = Vec::new();
        for characteristic in self.state.subscriptions.remove_central(&central) {
            events.push(PeripheralEvent::SubscriptionChanged {
                central: central.clone(),
                characteristic: characteristic.to_string(),
                subscribed: false,
            });
        }

        if self.state.connections.on_central_disconnected(&central) {
            events.push(PeripheralEvent::ConnectionStateChanged {
                central: central.clone(),
                connected: false,
            });
        }

        if self.config.reconnect == ReconnectPolicy::Reconnect {
            debug!("Reconnect policy active, reconnecting {}", central);
            if let Err(e) = self.platform.connect(&central).await {
                warn!("Reconnect for {} failed: {}", central, e);
            }
        }

        events
    }

    async fn handle_bond_state_changed(
        &mut self,
        central: CentralId,
        state: BondState,
    ) -> Vec<PeripheralEvent> {
        let action = self.state.connections.on_bond_state_changed(&central, state);
        let mut events = vec![PeripheralEvent::BondStateChanged {
            central: central.clone(),
            state,
        }];

        match action {
            BondAction::Connect => {
                if let Err(e) = self.platform.connect(&central).await {
                    warn!("Platform connect for {} failed: {}", central, e);
                }
                events.push(PeripheralEvent::ConnectionStateChanged {
                    central,
                    connected: true,
                });
            }
            BondAction::Dropped => {
                debug!("{} never completed bonding, staying disconnected", central);
            }
            BondAction::None => {}
        }

        events
    }

    async fn handle_read_requested(
        &mut self,
        request: RequestId,
        central: CentralId,
        characteristic: String,
        offset: u64,
    ) -> Vec<PeripheralEvent> {
        let Some(uuid) = self.lookup_characteristic(&characteristic) else {
            warn!("Read for unknown characteristic {:?}", characteristic);
            self.respond_read_now(request, Err(RequestStatus::InvalidHandle))
                .await;
            return Vec::new();
        };

        let cached = self.state.registry.cached_value(&uuid);
        let (responder, response) = oneshot::channel();
        self.spawn_read_waiter(request, response);

        vec![PeripheralEvent::ReadRequest {
            central,
            characteristic: uuid.to_string(),
            offset,
            value: cached,
            responder,
        }]
    }

    async fn handle_write_requested(
        &mut self,
        request: RequestId,
        central: CentralId,
        characteristic: String,
        offset: u64,
        value: Vec<u8>,
    ) -> Vec<PeripheralEvent> {
        let Some(uuid) = self.lookup_characteristic(&characteristic) else {
            warn!("Write for unknown characteristic {:?}", characteristic);
            self.respond_write_now(
                request,
                WriteResponse {
                    status: RequestStatus::InvalidHandle,
                    value: Some(value),
                    offset,
                },
            )
            .await;
            return Vec::new();
        };

        debug!(
            "Write request for {} ({} bytes): {}",
            uuid,
            value.len(),
            hex::encode(&value)
        );
        let (responder, response) = oneshot::channel();
        self.spawn_write_waiter(request, offset, value.clone(), response);

        vec![PeripheralEvent::WriteRequest {
            central,
            characteristic: uuid.to_string(),
            offset,
            value,
            responder,
        }]
    }

    async fn handle_descriptor_read(
        &mut self,
        request: RequestId,
        central: CentralId,
        characteristic: String,
        descriptor: String,
    ) -> Vec<PeripheralEvent> {
        let answer = self.resolve_descriptor_read(&central, &characteristic, &descriptor);
        self.respond_read_now(request, answer).await;
        Vec::new()
    }

    fn resolve_descriptor_read(
        &self,
        central: &CentralId,
        characteristic: &str,
        descriptor: &str,
    ) -> core::result::Result<ReadResponse, RequestStatus> {
        let char_uuid = self
            .lookup_characteristic(characteristic)
            .ok_or(RequestStatus::InvalidHandle)?;
        let desc_uuid = parse_ble_uuid(descriptor).map_err(|_| RequestStatus::InvalidHandle)?;
        let stored = self
            .state
            .registry
            .find_descriptor(&char_uuid, &desc_uuid)
            .ok_or(RequestStatus::InvalidHandle)?;

        if desc_uuid == CCCD_UUID {
            // The CCCD echoes this central's own configuration.
            let bits = self.state.subscriptions.config_bits(central, &char_uuid);
            return Ok(ReadResponse::new(bits.to_le_bytes().to_vec()));
        }
        Ok(ReadResponse::new(stored.value.clone().unwrap_or_default()))
    }

    async fn handle_descriptor_write(
        &mut self,
        request: RequestId,
        central: CentralId,
        characteristic: String,
        descriptor: String,
        value: Vec<u8>,
    ) -> Vec<PeripheralEvent> {
        match self.apply_descriptor_write(&central, &characteristic, &descriptor, &value) {
            Ok(change) => {
                self.respond_write_now(
                    request,
                    WriteResponse {
                        status: RequestStatus::Success,
                        value: Some(value),
                        offset: 0,
                    },
                )
                .await;
                match change {
                    Some((char_uuid, subscribed)) => vec![PeripheralEvent::SubscriptionChanged {
                        central,
                        characteristic: char_uuid.to_string(),
                        subscribed,
                    }],
                    None => Vec::new(),
                }
            }
            Err(status) => {
                warn!(
                    "Rejecting descriptor write to {:?} on {:?}: {:?}",
                    descriptor, characteristic, status
                );
                self.respond_write_now(
                    request,
                    WriteResponse {
                        status,
                        value: Some(value),
                        offset: 0,
                    },
                )
                .await;
                Vec::new()
            }
        }
    }

    /// Apply a descriptor write, returning a subscription transition when the
    /// target was a CCCD and the subscribed state changed.
    fn apply_descriptor_write(
        &mut self,
        central: &CentralId,
        characteristic: &str,
        descriptor: &str,
        value: &[u8],
    ) -> core::result::Result<Option<(Uuid, bool)>, RequestStatus> {
        let char_uuid = self
            .lookup_characteristic(characteristic)
            .ok_or(RequestStatus::InvalidHandle)?;
        let desc_uuid = parse_ble_uuid(descriptor).map_err(|_| RequestStatus::InvalidHandle)?;
        if self
            .state
            .registry
            .find_descriptor(&char_uuid, &desc_uuid)
            .is_none()
        {
            return Err(RequestStatus::InvalidHandle);
        }

        if desc_uuid == CCCD_UUID {
            let change = self
                .state
                .subscriptions
                .apply_cccd_write(central, char_uuid, value);
            return Ok(change.map(|subscribed| (char_uuid, subscribed)));
        }

        self.state
            .registry
            .update_descriptor_value(&char_uuid, &desc_uuid, value)
            .map_err(|_| RequestStatus::UnlikelyError)?;
        Ok(None)
    }

    // ------------------------------------------------------------------------
    // Update queue drain
    // ------------------------------------------------------------------------

    /// Push queued updates to the platform, one notification at a time, until
    /// the queue empties or the platform reports a full buffer.
    async fn drain_updates(&mut self) {
        if !self.state.queue.begin_drain() {
            return;
        }

        while let Some(send) = self
            .state
            .queue
            .prepare_head(&self.state.subscriptions, &self.state.connections)
        {
            match self
                .platform
                .notify_value(&send.central, send.characteristic, &send.payload)
                .await
            {
                Ok(SendOutcome::Accepted) => self.state.queue.mark_sent(),
                Ok(SendOutcome::BufferFull) => {
                    debug!("Platform buffer full, parking update queue");
                    self.state.queue.mark_buffer_full();
                    break;
                }
                Err(e) => {
                    warn!("Notify failed for {}: {}", send.central, e);
                    self.state.queue.mark_send_failed();
                }
            }
        }

        self.state.queue.finish_drain();
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Parse a characteristic identifier and confirm the registry hosts it.
    fn lookup_characteristic(&self, text: &str) -> Option<Uuid> {
        let uuid = parse_ble_uuid(text).ok()?;
        self.state
            .registry
            .find_characteristic(&uuid)
            .map(|characteristic| characteristic.uuid)
    }

    /// Answer a suspended read from the task itself.
    async fn respond_read_now(
        &self,
        request: RequestId,
        response: core::result::Result<ReadResponse, RequestStatus>,
    ) {
        if let Err(e) = self.platform.respond_to_read(request, response).await {
            warn!("Discarding response for stale request {}: {}", request, e);
        }
    }

    /// Answer a suspended write from the task itself.
    async fn respond_write_now(&self, request: RequestId, response: WriteResponse) {
        if let Err(e) = self.platform.respond_to_write(request, response).await {
            warn!("Discarding response for stale request {}: {}", request, e);
        }
    }

    /// Wait for the host's read answer off-task and forward it.
    fn spawn_read_waiter(&self, request: RequestId, response: oneshot::Receiver<ReadResponse>) {
        let platform = Arc::clone(&self.platform);
        tokio::spawn(async move {
            let answer = match response.await {
                Ok(read) => Ok(read),
                // A dropped responder rejects the read.
                Err(_) => Err(RequestStatus::UnlikelyError),
            };
            if let Err(e) = platform.respond_to_read(request, answer).await {
                warn!("Discarding response for stale request {}: {}", request, e);
            }
        });
    }

    /// Wait for the host's write answer off-task and forward it, echoing the
    /// request value when the host does not supply one.
    fn spawn_write_waiter(
        &self,
        request: RequestId,
        request_offset: u64,
        request_value: Vec<u8>,
        response: oneshot::Receiver<WriteResponse>,
    ) {
        let platform = Arc::clone(&self.platform);
        tokio::spawn(async move {
            let answer = match response.await {
                Ok(WriteResponse {
                    status,
                    value: Some(value),
                    offset,
                }) => WriteResponse {
                    status,
                    value: Some(value),
                    offset,
                },
                Ok(WriteResponse {
                    status,
                    value: None,
                    ..
                }) => WriteResponse {
                    status,
                    value: Some(request_value),
                    offset: request_offset,
                },
                // A dropped responder accepts the write with the echo.
                Err(_) => WriteResponse {
                    status: RequestStatus::Success,
                    value: Some(request_value),
                    offset: request_offset,
                },
            };
            if let Err(e) = platform.respond_to_write(request, answer).await {
                warn!("Discarding response for stale request {}: {}", request, e);
            }
        });
    }

    /// Deliver an event to the host.
    async fn emit(&mut self, event: PeripheralEvent) -> Result<()> {
        self.event_sender
            .send(event)
            .await
            .map_err(|_| GattwayError::channel("Peripheral event channel closed"))?;
        self.state.stats.events_emitted += 1;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Advertisement construction
// ----------------------------------------------------------------------------

/// Parse host advertising parameters into the platform form.
fn build_advertisement(params: AdvertisingParams) -> Result<Advertisement> {
    let mut service_uuids = Vec::with_capacity(params.service_uuids.len());
    for uuid in &params.service_uuids {
        service_uuids.push(parse_ble_uuid(uuid)?);
    }
    Ok(Advertisement {
        service_uuids,
        local_name: params.local_name,
        timeout: params.timeout,
        manufacturer_data: params.manufacturer_data,
        manufacturer_data_in_scan_response: params.manufacturer_data_in_scan_response,
    })
}
