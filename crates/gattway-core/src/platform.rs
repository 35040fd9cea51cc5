//! Platform capability trait
//!
//! The engine is platform-agnostic; everything that touches a real BLE stack
//! goes through this injected capability. Bindings wrap an OS peripheral
//! manager and deliver its callbacks back to the engine as `PlatformEvent`s
//! over the platform event channel.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::attributes::Service;
use crate::error::Result;
use crate::message::{ManufacturerData, ReadResponse, RequestStatus, WriteResponse};
use crate::types::{CentralId, RequestId};

// ----------------------------------------------------------------------------
// Send Outcome
// ----------------------------------------------------------------------------

/// Result of handing one value update to the platform send primitive
///
/// BLE stacks buffer a single in-flight notification per process; a rejected
/// send is not an error, it means wait for the ready signal and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The platform accepted the update into its send buffer
    Accepted,
    /// The send buffer is full; retry the same bytes after `ReadyToUpdate`
    BufferFull,
}

// ----------------------------------------------------------------------------
// Advertisement
// ----------------------------------------------------------------------------

/// Parsed advertisement handed to the platform binding
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    /// Service UUIDs to include
    pub service_uuids: Vec<Uuid>,
    /// Local device name
    pub local_name: Option<String>,
    /// Advertising duration, or None for indefinite
    pub timeout: Option<Duration>,
    /// Manufacturer-specific data block
    pub manufacturer_data: Option<ManufacturerData>,
    /// Whether manufacturer data goes in the scan response
    pub manufacturer_data_in_scan_response: bool,
}

// ----------------------------------------------------------------------------
// Platform Trait
// ----------------------------------------------------------------------------

/// Capability interface a platform binding implements
///
/// Completion of `add_service` and `start_advertising` is asynchronous on the
/// real stacks; bindings confirm via `ServiceAdded` and `AdvertisingStarted`
/// platform events rather than the method return.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Initialize the underlying peripheral manager
    async fn initialize(&self) -> Result<()>;

    /// Whether the adapter supports the peripheral role
    async fn is_supported(&self) -> Result<bool>;

    /// Prompt for the permissions the peripheral role needs
    async fn ask_permission(&self) -> Result<bool>;

    /// Register a service with the native GATT server
    async fn add_service(&self, service: &Service) -> Result<()>;

    /// Unregister a service from the native GATT server
    async fn remove_service(&self, uuid: Uuid) -> Result<()>;

    /// Unregister all services
    async fn clear_services(&self) -> Result<()>;

    /// Start broadcasting the given advertisement
    async fn start_advertising(&self, advertisement: &Advertisement) -> Result<()>;

    /// Stop broadcasting
    async fn stop_advertising(&self) -> Result<()>;

    /// Push one characteristic value update toward a central
    async fn notify_value(
        &self,
        central: &CentralId,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<SendOutcome>;

    /// Answer a suspended read request
    async fn respond_to_read(
        &self,
        request: RequestId,
        response: core::result::Result<ReadResponse, RequestStatus>,
    ) -> Result<()>;

    /// Answer a suspended write request
    async fn respond_to_write(&self, request: RequestId, response: WriteResponse) -> Result<()>;

    /// Begin pairing with a central
    async fn request_bond(&self, central: &CentralId) -> Result<()>;

    /// Perform the logical GATT connect for a bonded central
    async fn connect(&self, central: &CentralId) -> Result<()>;

    /// Tear down the connection to a central
    async fn disconnect(&self, central: &CentralId) -> Result<()>;
}
