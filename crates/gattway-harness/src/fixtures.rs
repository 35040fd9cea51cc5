//! Shared test fixtures.
//!
//! Service definitions and event helpers used across engine tests.

use std::time::Duration;

use gattway_core::{
    AttributePermission, CharacteristicDef, CharacteristicProperty, PeripheralEvent,
    PeripheralEventReceiver, ServiceDef,
};

/// Heart Rate service (16-bit short form).
pub const HEART_RATE_SERVICE: &str = "180d";
/// Heart Rate Measurement characteristic, notify-only.
pub const HEART_RATE_MEASUREMENT: &str = "2a37";
/// Body Sensor Location characteristic, read-only.
pub const BODY_SENSOR_LOCATION: &str = "2a38";

/// Vendor control service.
pub const CONTROL_SERVICE: &str = "9f6c0001-8a41-4f8e-9d4b-0db0d2f87e10";
/// Write-only control point characteristic.
pub const CONTROL_POINT: &str = "9f6c0002-8a41-4f8e-9d4b-0db0d2f87e10";
/// Readable, indicate-capable status characteristic.
pub const STATUS_CHARACTERISTIC: &str = "9f6c0003-8a41-4f8e-9d4b-0db0d2f87e10";

/// A heart rate service with a subscribable measurement and a readable
/// sensor location.
pub fn heart_rate_service() -> ServiceDef {
    ServiceDef::new(HEART_RATE_SERVICE)
        .with_characteristic(
            CharacteristicDef::new(HEART_RATE_MEASUREMENT)
                .with_properties(vec![CharacteristicProperty::Notify]),
        )
        .with_characteristic(
            CharacteristicDef::new(BODY_SENSOR_LOCATION)
                .with_properties(vec![CharacteristicProperty::Read])
                .with_permissions(vec![AttributePermission::Readable])
                .with_value(vec![0x01]),
        )
}

/// A vendor service with a writable control point and an indicate-capable
/// status characteristic.
pub fn control_service() -> ServiceDef {
    ServiceDef::new(CONTROL_SERVICE)
        .with_characteristic(
            CharacteristicDef::new(CONTROL_POINT)
                .with_properties(vec![
                    CharacteristicProperty::Write,
                    CharacteristicProperty::WriteWithoutResponse,
                ])
                .with_permissions(vec![AttributePermission::Writeable]),
        )
        .with_characteristic(
            CharacteristicDef::new(STATUS_CHARACTERISTIC)
                .with_properties(vec![
                    CharacteristicProperty::Read,
                    CharacteristicProperty::Indicate,
                ])
                .with_permissions(vec![AttributePermission::Readable])
                .with_value(vec![0x00]),
        )
}

/// Receive the next peripheral event, panicking after a timeout.
pub async fn next_event(events: &mut PeripheralEventReceiver) -> PeripheralEvent {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("Timed out waiting for peripheral event")
        .expect("Peripheral event channel closed")
}

/// Skip events until one matches the predicate, panicking if the channel
/// stalls first.
pub async fn wait_for_event(
    events: &mut PeripheralEventReceiver,
    mut matches: impl FnMut(&PeripheralEvent) -> bool,
) -> PeripheralEvent {
    loop {
        let event = next_event(events).await;
        if matches(&event) {
            return event;
        }
    }
}
