//! Mock Platform for Testing
//!
//! Provides a deterministic mock platform implementation for testing without
//! a Bluetooth stack. Records every call the engine makes, scripts notify
//! outcomes, and can confirm service adds and advertising starts
//! automatically the way a native stack would.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use gattway_core::{
    Advertisement, CentralId, GattwayError, Platform, PlatformEvent, PlatformEventSender,
    ReadResponse, RequestId, RequestStatus, Result, SendOutcome, Service, WriteResponse,
};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Recorded Calls
// ----------------------------------------------------------------------------

/// A platform call recorded by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    Initialize,
    IsSupported,
    AskPermission,
    AddService {
        uuid: Uuid,
    },
    RemoveService {
        uuid: Uuid,
    },
    ClearServices,
    StartAdvertising {
        service_uuids: Vec<Uuid>,
    },
    StopAdvertising,
    Notify {
        central: CentralId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    RespondToRead {
        request: RequestId,
        status: RequestStatus,
        value: Option<Vec<u8>>,
    },
    RespondToWrite {
        request: RequestId,
        status: RequestStatus,
        value: Option<Vec<u8>>,
    },
    RequestBond {
        central: CentralId,
    },
    Connect {
        central: CentralId,
    },
    Disconnect {
        central: CentralId,
    },
}

/// Scripted result for a notify_value call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyScript {
    Accept,
    BufferFull,
    Fail,
}

// ----------------------------------------------------------------------------
// Mock Platform
// ----------------------------------------------------------------------------

struct MockState {
    calls: Vec<PlatformCall>,
    notify_script: VecDeque<NotifyScript>,
    add_service_errors: VecDeque<String>,
    advertising_errors: VecDeque<String>,
    fail_next: Option<String>,
    supported: bool,
    permission: bool,
    event_sender: Option<PlatformEventSender>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            notify_script: VecDeque::new(),
            add_service_errors: VecDeque::new(),
            advertising_errors: VecDeque::new(),
            fail_next: None,
            supported: true,
            permission: true,
            event_sender: None,
        }
    }
}

impl MockState {
    fn take_failure(&mut self) -> Result<()> {
        match self.fail_next.take() {
            Some(reason) => Err(GattwayError::platform(reason)),
            None => Ok(()),
        }
    }

    /// Push an event toward the engine without blocking the caller.
    fn queue_event(&self, event: PlatformEvent) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.try_send(event) {
                debug!("Mock platform dropped event: {}", e);
            }
        }
    }
}

/// Mock platform for deterministic engine testing.
#[derive(Clone)]
pub struct MockPlatform {
    /// Whether service adds and advertising starts confirm themselves.
    auto_confirm: bool,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// Create a mock that confirms adds and advertising automatically.
    pub fn new() -> Self {
        Self {
            auto_confirm: true,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a mock that leaves confirmations to the test.
    pub fn manual() -> Self {
        Self {
            auto_confirm: false,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Attach the sender the mock uses to deliver platform events.
    pub async fn attach_event_sender(&self, sender: PlatformEventSender) {
        self.state.lock().await.event_sender = Some(sender);
    }

    /// Deliver a platform event to the engine, as a native callback would.
    pub async fn emit(&self, event: PlatformEvent) -> Result<()> {
        let sender = self.state.lock().await.event_sender.clone();
        match sender {
            Some(sender) => sender
                .send(event)
                .await
                .map_err(|_| GattwayError::channel("Platform event channel closed")),
            None => Err(GattwayError::invalid_state("No event sender attached")),
        }
    }

    /// Get all recorded calls.
    pub async fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().await.calls.clone()
    }

    /// Clear the recorded calls.
    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Get the payloads of recorded notifies, in order.
    pub async fn notified_values(&self) -> Vec<(CentralId, Uuid, Vec<u8>)> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Notify {
                    central,
                    characteristic,
                    value,
                } => Some((central.clone(), *characteristic, value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Script outcomes for upcoming notify_value calls, in order.
    pub async fn script_notify(&self, outcomes: Vec<NotifyScript>) {
        self.state.lock().await.notify_script.extend(outcomes);
    }

    /// Make the next platform call return the given error.
    pub async fn fail_next_call(&self, reason: impl Into<String>) {
        self.state.lock().await.fail_next = Some(reason.into());
    }

    /// Make the next auto-confirmed service add report the given error.
    pub async fn script_add_service_error(&self, error: impl Into<String>) {
        self.state
            .lock()
            .await
            .add_service_errors
            .push_back(error.into());
    }

    /// Make the next auto-confirmed advertising start report the given error.
    pub async fn script_advertising_error(&self, error: impl Into<String>) {
        self.state
            .lock()
            .await
            .advertising_errors
            .push_back(error.into());
    }

    /// Poll until the recorded calls satisfy the predicate, panicking on
    /// timeout. Returns the calls that satisfied it.
    pub async fn wait_for_calls(
        &self,
        mut predicate: impl FnMut(&[PlatformCall]) -> bool,
    ) -> Vec<PlatformCall> {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        loop {
            let calls = self.calls().await;
            if predicate(&calls) {
                return calls;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("Timed out waiting for platform calls, saw {:?}", calls);
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    /// Set the answer for is_supported.
    pub async fn set_supported(&self, supported: bool) {
        self.state.lock().await.supported = supported;
    }

    /// Set the answer for ask_permission.
    pub async fn set_permission(&self, permission: bool) {
        self.state.lock().await.permission = permission;
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::Initialize);
        state.take_failure()
    }

    async fn is_supported(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::IsSupported);
        state.take_failure()?;
        Ok(state.supported)
    }

    async fn ask_permission(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::AskPermission);
        state.take_failure()?;
        Ok(state.permission)
    }

    async fn add_service(&self, service: &Service) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::AddService {
            uuid: service.uuid,
        });
        state.take_failure()?;
        if self.auto_confirm {
            let error = state.add_service_errors.pop_front();
            state.queue_event(PlatformEvent::ServiceAdded {
                uuid: service.uuid.to_string(),
                error,
            });
        }
        Ok(())
    }

    async fn remove_service(&self, uuid: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::RemoveService { uuid });
        state.take_failure()
    }

    async fn clear_services(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::ClearServices);
        state.take_failure()
    }

    async fn start_advertising(&self, advertisement: &Advertisement) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::StartAdvertising {
            service_uuids: advertisement.service_uuids.clone(),
        });
        state.take_failure()?;
        if self.auto_confirm {
            let error = state.advertising_errors.pop_front();
            state.queue_event(PlatformEvent::AdvertisingStarted { error });
        }
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::StopAdvertising);
        state.take_failure()
    }

    async fn notify_value(
        &self,
        central: &CentralId,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<SendOutcome> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::Notify {
            central: central.clone(),
            characteristic,
            value: value.to_vec(),
        });
        state.take_failure()?;
        match state.notify_script.pop_front().unwrap_or(NotifyScript::Accept) {
            NotifyScript::Accept => Ok(SendOutcome::Accepted),
            NotifyScript::BufferFull => Ok(SendOutcome::BufferFull),
            NotifyScript::Fail => Err(GattwayError::platform("Scripted notify failure")),
        }
    }

    async fn respond_to_read(
        &self,
        request: RequestId,
        response: core::result::Result<ReadResponse, RequestStatus>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let (status, value) = match response {
            Ok(read) => (RequestStatus::Success, Some(read.value)),
            Err(status) => (status, None),
        };
        state.calls.push(PlatformCall::RespondToRead {
            request,
            status,
            value,
        });
        state.take_failure()
    }

    async fn respond_to_write(&self, request: RequestId, response: WriteResponse) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::RespondToWrite {
            request,
            status: response.status,
            value: response.value,
        });
        state.take_failure()
    }

    async fn request_bond(&self, central: &CentralId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::RequestBond {
            central: central.clone(),
        });
        state.take_failure()
    }

    async fn connect(&self, central: &CentralId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::Connect {
            central: central.clone(),
        });
        state.take_failure()
    }

    async fn disconnect(&self, central: &CentralId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::Disconnect {
            central: central.clone(),
        });
        state.take_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gattway_core::{create_platform_event_channel, ChannelConfig};

    #[tokio::test]
    async fn test_mock_records_calls() {
        let mock = MockPlatform::new();

        mock.initialize().await.unwrap();
        assert!(mock.is_supported().await.unwrap());

        let calls = mock.calls().await;
        assert_eq!(
            calls,
            vec![PlatformCall::Initialize, PlatformCall::IsSupported]
        );

        mock.clear_calls().await;
        assert!(mock.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_scripted_notify_outcomes() {
        let mock = MockPlatform::new();
        let central = CentralId::from("AA:BB:CC:DD:EE:FF");
        let characteristic = Uuid::new_v4();

        mock.script_notify(vec![NotifyScript::BufferFull, NotifyScript::Fail])
            .await;

        let first = mock
            .notify_value(&central, characteristic, &[1])
            .await
            .unwrap();
        assert_eq!(first, SendOutcome::BufferFull);

        assert!(mock.notify_value(&central, characteristic, &[2]).await.is_err());

        // Script exhausted: accepts by default
        let third = mock
            .notify_value(&central, characteristic, &[3])
            .await
            .unwrap();
        assert_eq!(third, SendOutcome::Accepted);
    }

    #[tokio::test]
    async fn test_auto_confirm_queues_service_added() {
        let mock = MockPlatform::new();
        let (sender, mut receiver) = create_platform_event_channel(&ChannelConfig::testing());
        mock.attach_event_sender(sender).await;

        let service = Service::from_def(gattway_core::ServiceDef::new("180d")).unwrap();
        mock.add_service(&service).await.unwrap();

        match receiver.recv().await {
            Some(PlatformEvent::ServiceAdded { uuid, error }) => {
                assert_eq!(uuid, service.uuid.to_string());
                assert!(error.is_none());
            }
            other => panic!("Expected ServiceAdded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_manual_mock_stays_silent() {
        let mock = MockPlatform::manual();
        let (sender, mut receiver) = create_platform_event_channel(&ChannelConfig::testing());
        mock.attach_event_sender(sender).await;

        let service = Service::from_def(gattway_core::ServiceDef::new("180d")).unwrap();
        mock.add_service(&service).await.unwrap();

        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fail_next_call() {
        let mock = MockPlatform::new();

        mock.fail_next_call("adapter off").await;
        assert!(mock.initialize().await.is_err());

        // Failure consumed; next call succeeds
        assert!(mock.initialize().await.is_ok());
    }
}
