//! Integration tests for subscriptions and the update queue
//!
//! Covers CCCD subscribe/unsubscribe flows, broadcast and targeted update
//! delivery, and buffer-full flow control against the mock platform.


use gattway_core::{
    parse_ble_uuid, CentralId, PlatformEvent, RequestId, RequestStatus, CCCD_UUID,
};
use gattway_harness::{
    heart_rate_service, wait_for_event, NotifyScript, PlatformCall, HEART_RATE_MEASUREMENT,
};
use gattway_runtime::PeripheralEvent;
use test_utils::{connect_bonded, start_engine, subscribe};
use tokio::time::{sleep, Duration};

fn notify_count(calls: &[PlatformCall]) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, PlatformCall::Notify { .. }))
        .count()
}

#[tokio::test]
async fn test_subscribe_and_notify_round_trip() {
    let (platform, mut handle, mut events) = start_engine().await;
    let central = CentralId::from("AA:BB:CC:DD:EE:11");

    handle.add_service(heart_rate_service()).await.unwrap();
    connect_bonded(&platform, &mut events, &central).await;
    subscribe(&platform, &mut events, &central, HEART_RATE_MEASUREMENT, 1).await;

    // The CCCD write was acknowledged toward the stack
    platform
        .wait_for_calls(|calls| {
            calls.iter().any(|c| {
                matches!(
                    c,
                    PlatformCall::RespondToWrite { status: RequestStatus::Success, .. }
                )
            })
        })
        .await;
    assert_eq!(
        handle.get_subscribed_clients().await.unwrap(),
        vec![central.clone()]
    );

    handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0x06, 0x48], None)
        .await
        .unwrap();
    platform.wait_for_calls(|calls| notify_count(calls) == 1).await;

    let measurement = parse_ble_uuid(HEART_RATE_MEASUREMENT).unwrap();
    let notified = platform.notified_values().await;
    assert_eq!(notified, vec![(central, measurement, vec![0x06, 0x48])]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_update_without_subscribers_dropped() {
    let (platform, mut handle, _events) = start_engine().await;

    handle.add_service(heart_rate_service()).await.unwrap();
    handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0x01], None)
        .await
        .expect("update should succeed with no subscribers");

    sleep(Duration::from_millis(50)).await;
    assert!(platform.notified_values().await.is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_targeted_update_requires_connection() {
    let (_platform, mut handle, _events) = start_engine().await;

    handle.add_service(heart_rate_service()).await.unwrap();

    let stranger = CentralId::from("AA:BB:CC:DD:EE:12");
    let result = handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0x01], Some(stranger))
        .await;
    assert!(
        result.is_err(),
        "targeted update to a disconnected central should fail"
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_targeted_update_reaches_only_target() {
    let (platform, mut handle, mut events) = start_engine().await;
    let subscriber = CentralId::from("AA:BB:CC:DD:EE:13");
    let target = CentralId::from("AA:BB:CC:DD:EE:14");

    handle.add_service(heart_rate_service()).await.unwrap();
    connect_bonded(&platform, &mut events, &subscriber).await;
    connect_bonded(&platform, &mut events, &target).await;
    subscribe(&platform, &mut events, &subscriber, HEART_RATE_MEASUREMENT, 1).await;

    // The target never subscribed, but explicit delivery still reaches it
    handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0xAA], Some(target.clone()))
        .await
        .unwrap();
    platform.wait_for_calls(|calls| notify_count(calls) == 1).await;

    let notified = platform.notified_values().await;
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].0, target);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_updates_drain_in_fifo_order() {
    let (platform, mut handle, mut events) = start_engine().await;
    let central = CentralId::from("AA:BB:CC:DD:EE:15");

    handle.add_service(heart_rate_service()).await.unwrap();
    connect_bonded(&platform, &mut events, &central).await;
    subscribe(&platform, &mut events, &central, HEART_RATE_MEASUREMENT, 1).await;

    handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0x01], None)
        .await
        .unwrap();
    handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0x02], None)
        .await
        .unwrap();

    platform.wait_for_calls(|calls| notify_count(calls) == 2).await;
    let notified = platform.notified_values().await;
    assert_eq!(notified[0].2, vec![0x01]);
    assert_eq!(notified[1].2, vec![0x02]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_buffer_full_retries_byte_for_byte() {
    let (platform, mut handle, mut events) = start_engine().await;
    let central = CentralId::from("AA:BB:CC:DD:EE:16");

    handle.add_service(heart_rate_service()).await.unwrap();
    connect_bonded(&platform, &mut events, &central).await;
    subscribe(&platform, &mut events, &central, HEART_RATE_MEASUREMENT, 1).await;

    platform.script_notify(vec![NotifyScript::BufferFull]).await;
    handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0x10, 0x20], None)
        .await
        .unwrap();

    // First attempt hit the full buffer
    platform.wait_for_calls(|calls| notify_count(calls) == 1).await;

    // Nothing moves until the platform signals room
    sleep(Duration::from_millis(50)).await;
    assert_eq!(platform.notified_values().await.len(), 1);

    platform.emit(PlatformEvent::ReadyToUpdate).await.unwrap();
    platform.wait_for_calls(|calls| notify_count(calls) == 2).await;

    // The retry resends the same bytes to the same central
    let notified = platform.notified_values().await;
    assert_eq!(notified[0], notified[1]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_late_subscriber_not_spliced_into_parked_update() {
    let (platform, mut handle, mut events) = start_engine().await;
    let early = CentralId::from("AA:BB:CC:DD:EE:17");
    let late = CentralId::from("AA:BB:CC:DD:EE:18");

    handle.add_service(heart_rate_service()).await.unwrap();
    connect_bonded(&platform, &mut events, &early).await;
    connect_bonded(&platform, &mut events, &late).await;
    subscribe(&platform, &mut events, &early, HEART_RATE_MEASUREMENT, 1).await;

    // Park the update against a full buffer
    platform.script_notify(vec![NotifyScript::BufferFull]).await;
    handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0x01], None)
        .await
        .unwrap();
    platform.wait_for_calls(|calls| notify_count(calls) == 1).await;

    // A new subscriber arrives while the update is parked
    subscribe(&platform, &mut events, &late, HEART_RATE_MEASUREMENT, 2).await;

    platform.emit(PlatformEvent::ReadyToUpdate).await.unwrap();
    platform.wait_for_calls(|calls| notify_count(calls) == 2).await;
    sleep(Duration::from_millis(50)).await;

    // The parked update keeps its original audience
    let notified = platform.notified_values().await;
    assert_eq!(notified.len(), 2);
    assert!(notified.iter().all(|(central, _, _)| *central == early));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_parked_update_skips_departed_subscriber() {
    let (platform, mut handle, mut events) = start_engine().await;
    let central = CentralId::from("AA:BB:CC:DD:EE:19");

    handle.add_service(heart_rate_service()).await.unwrap();
    connect_bonded(&platform, &mut events, &central).await;
    subscribe(&platform, &mut events, &central, HEART_RATE_MEASUREMENT, 1).await;

    platform.script_notify(vec![NotifyScript::BufferFull]).await;
    handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0x77], None)
        .await
        .unwrap();
    platform.wait_for_calls(|calls| notify_count(calls) == 1).await;

    // The subscriber drops while the update is parked
    platform
        .emit(PlatformEvent::CentralDisconnected {
            central: central.clone(),
        })
        .await
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(
            e,
            PeripheralEvent::ConnectionStateChanged { connected: false, .. }
        )
    })
    .await;

    platform.emit(PlatformEvent::ReadyToUpdate).await.unwrap();
    sleep(Duration::from_millis(50)).await;

    // No retry toward the departed central
    assert_eq!(platform.notified_values().await.len(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_notify_failure_advances_to_next_subscriber() {
    let (platform, mut handle, mut events) = start_engine().await;
    let first = CentralId::from("AA:BB:CC:DD:EE:1A");
    let second = CentralId::from("AA:BB:CC:DD:EE:1B");

    handle.add_service(heart_rate_service()).await.unwrap();
    connect_bonded(&platform, &mut events, &first).await;
    connect_bonded(&platform, &mut events, &second).await;
    subscribe(&platform, &mut events, &first, HEART_RATE_MEASUREMENT, 1).await;
    subscribe(&platform, &mut events, &second, HEART_RATE_MEASUREMENT, 2).await;

    // The first send fails; the second subscriber still gets the update
    platform.script_notify(vec![NotifyScript::Fail]).await;
    handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0x42], None)
        .await
        .unwrap();

    platform.wait_for_calls(|calls| notify_count(calls) == 2).await;
    let notified = platform.notified_values().await;
    assert_eq!(notified[0].0, first);
    assert_eq!(notified[1].0, second);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsubscribe_stops_notifications() {
    let (platform, mut handle, mut events) = start_engine().await;
    let central = CentralId::from("AA:BB:CC:DD:EE:1C");

    handle.add_service(heart_rate_service()).await.unwrap();
    connect_bonded(&platform, &mut events, &central).await;
    subscribe(&platform, &mut events, &central, HEART_RATE_MEASUREMENT, 1).await;

    // Disable through the CCCD
    platform
        .emit(PlatformEvent::DescriptorWriteRequested {
            request: RequestId::new(2),
            central: central.clone(),
            characteristic: HEART_RATE_MEASUREMENT.to_string(),
            descriptor: CCCD_UUID.to_string(),
            value: vec![0x00, 0x00],
        })
        .await
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(
            e,
            PeripheralEvent::SubscriptionChanged { subscribed: false, .. }
        )
    })
    .await;
    assert!(handle.get_subscribed_clients().await.unwrap().is_empty());

    handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0x01], None)
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert!(platform.notified_values().await.is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_redundant_cccd_write_reports_nothing() {
    let (platform, mut handle, mut events) = start_engine().await;
    let central = CentralId::from("AA:BB:CC:DD:EE:1D");

    handle.add_service(heart_rate_service()).await.unwrap();
    connect_bonded(&platform, &mut events, &central).await;
    subscribe(&platform, &mut events, &central, HEART_RATE_MEASUREMENT, 1).await;

    // Re-enabling an enabled subscription acknowledges without reporting
    platform
        .emit(PlatformEvent::DescriptorWriteRequested {
            request: RequestId::new(2),
            central: central.clone(),
            characteristic: HEART_RATE_MEASUREMENT.to_string(),
            descriptor: CCCD_UUID.to_string(),
            value: vec![0x01, 0x00],
        })
        .await
        .unwrap();

    platform
        .wait_for_calls(|calls| {
            calls
                .iter()
                .filter(|c| {
                    matches!(
                        c,
                        PlatformCall::RespondToWrite { status: RequestStatus::Success, .. }
                    )
                })
                .count()
                == 2
        })
        .await;
    assert!(
        events.try_recv().is_err(),
        "redundant CCCD write should not re-report"
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cccd_read_echoes_configuration() {
    let (platform, mut handle, mut events) = start_engine().await;
    let central = CentralId::from("AA:BB:CC:DD:EE:1E");

    handle.add_service(heart_rate_service()).await.unwrap();
    connect_bonded(&platform, &mut events, &central).await;

    // Before subscribing the CCCD reads as disabled
    platform
        .emit(PlatformEvent::DescriptorReadRequested {
            request: RequestId::new(1),
            central: central.clone(),
            characteristic: HEART_RATE_MEASUREMENT.to_string(),
            descriptor: CCCD_UUID.to_string(),
        })
        .await
        .unwrap();
    platform
        .wait_for_calls(|calls| {
            calls.iter().any(|c| {
                matches!(
                    c,
                    PlatformCall::RespondToRead { value: Some(v), .. } if v.as_slice() == [0x00, 0x00]
                )
            })
        })
        .await;

    subscribe(&platform, &mut events, &central, HEART_RATE_MEASUREMENT, 2).await;

    // Afterwards it reflects this central's notify bit
    platform
        .emit(PlatformEvent::DescriptorReadRequested {
            request: RequestId::new(3),
            central: central.clone(),
            characteristic: HEART_RATE_MEASUREMENT.to_string(),
            descriptor: CCCD_UUID.to_string(),
        })
        .await
        .unwrap();
    platform
        .wait_for_calls(|calls| {
            calls.iter().any(|c| {
                matches!(
                    c,
                    PlatformCall::RespondToRead { value: Some(v), .. } if v.as_slice() == [0x01, 0x00]
                )
            })
        })
        .await;

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_update_of_unknown_characteristic_fails() {
    let (_platform, mut handle, _events) = start_engine().await;

    let result = handle
        .update_characteristic(HEART_RATE_MEASUREMENT, vec![0x01], None)
        .await;
    assert!(
        result.is_err(),
        "update of an unregistered characteristic should fail"
    );

    handle.shutdown().await.unwrap();
}
