//! gattway core types and channel schema
//!
//! This crate provides the stable surface shared by the peripheral engine,
//! platform bindings, and host applications: the GATT attribute model, the
//! command/event message protocol, channel constructors, configuration, the
//! error taxonomy, and the platform capability trait.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod attributes;
pub mod channel;
pub mod config;
pub mod error;
pub mod message;
pub mod platform;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use attributes::{
    parse_ble_uuid, AttributePermission, Characteristic, CharacteristicDef,
    CharacteristicProperty, Descriptor, DescriptorDef, Service, ServiceDef, CCCD_UUID,
};
pub use channel::{
    create_command_channel, create_peripheral_event_channel, create_platform_event_channel,
    CommandReceiver, CommandSender, PeripheralEventReceiver, PeripheralEventSender,
    PlatformEventReceiver, PlatformEventSender,
};
pub use config::{ChannelConfig, PeripheralConfig, ReconnectPolicy};
pub use error::{GattwayError, GattwayResult, Result};
pub use message::{
    AckSender, AdvertisingParams, Command, ManufacturerData, PeripheralEvent, PlatformEvent,
    ReadResponder, ReadResponse, ReplySender, RequestStatus, WriteResponder, WriteResponse,
};
pub use platform::{Advertisement, Platform, SendOutcome};
pub use types::{BondState, CentralId, RequestId};
