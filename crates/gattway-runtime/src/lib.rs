//! Gattway Peripheral Engine
//!
//! This crate contains the peripheral engine for gattway, including:
//! - `PeripheralBuilder`: Wires a platform binding into a running engine
//! - `PeripheralTask`: The single-task state machine handling GATT logic
//! - Attribute registry, subscription, update queue, connection, and
//!   advertising managers
//!
//! This is the "engine" of gattway - it orchestrates the GATT server logic
//! while `gattway-core` provides the stable API definitions.

pub mod builder;
pub mod logic;
pub mod managers;

pub use builder::{create_test_peripheral, PeripheralBuilder, PeripheralHandle};
pub use logic::{EngineStats, PeripheralState, PeripheralTask};
pub use managers::*;

// Re-export core types for convenience
pub use gattway_core::{
    create_command_channel, create_peripheral_event_channel, create_platform_event_channel,
    AdvertisingParams, BondState, CentralId, CharacteristicDef, Command, CommandReceiver,
    CommandSender, DescriptorDef, GattwayError, GattwayResult, ManufacturerData, PeripheralConfig,
    PeripheralEvent, PeripheralEventReceiver, PeripheralEventSender, Platform, PlatformEvent,
    PlatformEventReceiver, PlatformEventSender, ReadResponse, ReconnectPolicy, RequestId,
    RequestStatus, ServiceDef, WriteResponse,
};
