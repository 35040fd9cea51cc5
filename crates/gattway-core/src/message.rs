//! Channel message types for the peripheral engine
//!
//! This module defines the typed communication protocol between the host
//! application, the peripheral task, and the platform binding. All inter-task
//! communication flows through these message types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::attributes::ServiceDef;
use crate::error::Result;
use crate::types::{BondState, CentralId, RequestId};

// ----------------------------------------------------------------------------
// Reply Channels
// ----------------------------------------------------------------------------

/// One-shot acknowledgement for a fallible command
pub type AckSender = oneshot::Sender<Result<()>>;

/// One-shot reply carrying a value for a query command
pub type ReplySender<T> = oneshot::Sender<Result<T>>;

/// One-shot responder for a suspended read request
///
/// Dropping the sender rejects the read; the engine answers the central with
/// a generic failure status.
pub type ReadResponder = oneshot::Sender<ReadResponse>;

/// One-shot responder for a suspended write request
///
/// Dropping the sender accepts the write with default success semantics,
/// echoing the request's offset and value back to the platform.
pub type WriteResponder = oneshot::Sender<WriteResponse>;

// ----------------------------------------------------------------------------
// Command: Host → Peripheral Task
// ----------------------------------------------------------------------------

/// Commands sent from the host application to the peripheral task
#[derive(Debug)]
pub enum Command {
    /// Initialize the platform binding
    Initialize { reply: AckSender },
    /// Query whether the platform supports the peripheral role
    IsSupported { reply: ReplySender<bool> },
    /// Query whether advertising is currently active
    IsAdvertising { reply: ReplySender<bool> },
    /// Ask the platform to prompt for the permissions the peripheral needs
    AskPermission { reply: ReplySender<bool> },
    /// Register a service definition with the attribute registry
    AddService {
        definition: ServiceDef,
        reply: AckSender,
    },
    /// Remove a registered service by UUID
    RemoveService { uuid: String, reply: AckSender },
    /// Remove all registered services
    ClearServices { reply: AckSender },
    /// List registered service UUIDs in registration order
    GetServices { reply: ReplySender<Vec<String>> },
    /// List centrals currently holding at least one subscription
    GetSubscribedClients {
        reply: ReplySender<Vec<CentralId>>,
    },
    /// Start advertising with the given parameters
    StartAdvertising {
        params: AdvertisingParams,
        reply: AckSender,
    },
    /// Stop advertising
    StopAdvertising { reply: AckSender },
    /// Enqueue a characteristic value update
    ///
    /// A None target fans out to the characteristic's subscribers, resolved
    /// at send time.
    UpdateCharacteristic {
        characteristic: String,
        payload: Vec<u8>,
        target: Option<CentralId>,
        reply: AckSender,
    },
    /// Shut the peripheral task down gracefully
    Shutdown,
}

/// Structured advertising parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertisingParams {
    /// Service UUIDs to include in the advertisement, as transport strings
    pub service_uuids: Vec<String>,
    /// Local device name
    pub local_name: Option<String>,
    /// Advertising duration, or None for indefinite
    pub timeout: Option<Duration>,
    /// Manufacturer-specific data block
    pub manufacturer_data: Option<ManufacturerData>,
    /// Whether manufacturer data goes in the scan response instead of the
    /// primary advertisement
    pub manufacturer_data_in_scan_response: bool,
}

impl AdvertisingParams {
    /// Create parameters advertising the given service UUIDs
    pub fn new(service_uuids: Vec<String>) -> Self {
        Self {
            service_uuids,
            local_name: None,
            timeout: None,
            manufacturer_data: None,
            manufacturer_data_in_scan_response: false,
        }
    }

    /// Set the local device name
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    /// Set the advertising duration
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the manufacturer data block
    pub fn with_manufacturer_data(mut self, data: ManufacturerData) -> Self {
        self.manufacturer_data = Some(data);
        self
    }
}

/// Manufacturer-specific advertising data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturerData {
    /// Bluetooth SIG company identifier
    pub company_id: u16,
    /// Opaque payload bytes
    pub data: Vec<u8>,
}

// ----------------------------------------------------------------------------
// Platform Event: Platform Binding → Peripheral Task
// ----------------------------------------------------------------------------

/// Events delivered by the platform binding to the peripheral task
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    /// The adapter powered on or off
    AdapterStateChanged { powered: bool },
    /// An asynchronous advertising start completed, possibly with an error
    AdvertisingStarted { error: Option<String> },
    /// Advertising stopped on the platform side
    AdvertisingStopped,
    /// An asynchronous service registration completed
    ServiceAdded {
        uuid: String,
        error: Option<String>,
    },
    /// A central established a link-layer connection
    CentralConnected {
        central: CentralId,
        bond_state: BondState,
    },
    /// A central disconnected
    CentralDisconnected { central: CentralId },
    /// A central's bond state changed
    BondStateChanged {
        central: CentralId,
        state: BondState,
    },
    /// The negotiated MTU for a central changed
    MtuChanged { central: CentralId, mtu: u16 },
    /// A central issued a characteristic read, suspended pending a response
    ReadRequested {
        request: RequestId,
        central: CentralId,
        characteristic: String,
        offset: u64,
    },
    /// A central issued a characteristic write, suspended pending a response
    WriteRequested {
        request: RequestId,
        central: CentralId,
        characteristic: String,
        offset: u64,
        value: Vec<u8>,
    },
    /// A central issued a descriptor read, suspended pending a response
    DescriptorReadRequested {
        request: RequestId,
        central: CentralId,
        characteristic: String,
        descriptor: String,
    },
    /// A central issued a descriptor write, suspended pending a response
    DescriptorWriteRequested {
        request: RequestId,
        central: CentralId,
        characteristic: String,
        descriptor: String,
        value: Vec<u8>,
    },
    /// The platform send buffer drained; the update queue may resume
    ReadyToUpdate,
}

// ----------------------------------------------------------------------------
// Peripheral Event: Peripheral Task → Host
// ----------------------------------------------------------------------------

/// Events delivered to the host application's callback stream
#[derive(Debug)]
pub enum PeripheralEvent {
    /// Adapter power state changed
    StateChanged { powered: bool },
    /// Advertising started, stopped, or failed
    AdvertisingStatusChanged {
        advertising: bool,
        error: Option<String>,
    },
    /// A service registration completed
    ServiceAdded {
        service: String,
        error: Option<String>,
    },
    /// A central entered or left the connected set
    ConnectionStateChanged {
        central: CentralId,
        connected: bool,
    },
    /// A central's bond state changed
    BondStateChanged {
        central: CentralId,
        state: BondState,
    },
    /// The negotiated MTU for a central changed
    MtuChanged { central: CentralId, mtu: u16 },
    /// A central subscribed to or unsubscribed from a characteristic
    SubscriptionChanged {
        central: CentralId,
        characteristic: String,
        subscribed: bool,
    },
    /// A central is reading a characteristic; answer via the responder
    ReadRequest {
        central: CentralId,
        characteristic: String,
        offset: u64,
        /// Current cached value, if any
        value: Option<Vec<u8>>,
        responder: ReadResponder,
    },
    /// A central is writing a characteristic; answer via the responder
    WriteRequest {
        central: CentralId,
        characteristic: String,
        offset: u64,
        value: Vec<u8>,
        responder: WriteResponder,
    },
}

// ----------------------------------------------------------------------------
// Request Responses
// ----------------------------------------------------------------------------

/// Host answer to a read request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse {
    /// Bytes to return to the central
    pub value: Vec<u8>,
    /// Offset the value starts at
    pub offset: u64,
}

impl ReadResponse {
    /// Answer with a value at offset zero
    pub fn new(value: Vec<u8>) -> Self {
        Self { value, offset: 0 }
    }
}

/// Host answer to a write request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    /// ATT status to report to the central
    pub status: RequestStatus,
    /// Value to echo back, or None to echo the request's value
    pub value: Option<Vec<u8>>,
    /// Offset to echo back
    pub offset: u64,
}

impl WriteResponse {
    /// Accept the write, echoing the request's value
    pub fn success() -> Self {
        Self {
            status: RequestStatus::Success,
            value: None,
            offset: 0,
        }
    }

    /// Reject the write with the given status
    pub fn rejected(status: RequestStatus) -> Self {
        Self {
            status,
            value: None,
            offset: 0,
        }
    }
}

/// ATT-level status for request responses
///
/// Covers the subset of ATT error codes the platform bindings map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Success,
    InvalidHandle,
    ReadNotPermitted,
    WriteNotPermitted,
    RequestNotSupported,
    InvalidOffset,
    InsufficientAuthorization,
    UnlikelyError,
}

impl RequestStatus {
    /// The ATT error code carried on the wire
    pub fn att_code(&self) -> u8 {
        match self {
            RequestStatus::Success => 0x00,
            RequestStatus::InvalidHandle => 0x01,
            RequestStatus::ReadNotPermitted => 0x02,
            RequestStatus::WriteNotPermitted => 0x03,
            RequestStatus::RequestNotSupported => 0x06,
            RequestStatus::InvalidOffset => 0x07,
            RequestStatus::InsufficientAuthorization => 0x08,
            RequestStatus::UnlikelyError => 0x0e,
        }
    }

    /// Whether this status reports success
    pub fn is_success(&self) -> bool {
        matches!(self, RequestStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_status_att_codes() {
        assert_eq!(RequestStatus::Success.att_code(), 0x00);
        assert_eq!(RequestStatus::InvalidHandle.att_code(), 0x01);
        assert_eq!(RequestStatus::RequestNotSupported.att_code(), 0x06);
        assert_eq!(RequestStatus::InvalidOffset.att_code(), 0x07);
        assert_eq!(RequestStatus::UnlikelyError.att_code(), 0x0e);
        assert!(RequestStatus::Success.is_success());
        assert!(!RequestStatus::UnlikelyError.is_success());
    }

    #[test]
    fn test_write_response_defaults() {
        let ok = WriteResponse::success();
        assert!(ok.status.is_success());
        assert!(ok.value.is_none());

        let rejected = WriteResponse::rejected(RequestStatus::WriteNotPermitted);
        assert_eq!(rejected.status, RequestStatus::WriteNotPermitted);
    }

    #[test]
    fn test_advertising_params_builder() {
        let params = AdvertisingParams::new(vec!["180F".to_string()])
            .with_local_name("thermo")
            .with_timeout(Duration::from_secs(30))
            .with_manufacturer_data(ManufacturerData {
                company_id: 0x004c,
                data: vec![0x01],
            });

        assert_eq!(params.local_name.as_deref(), Some("thermo"));
        assert_eq!(params.timeout, Some(Duration::from_secs(30)));
        assert!(!params.manufacturer_data_in_scan_response);
    }
}
