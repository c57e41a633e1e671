//! End-to-end scan lifecycle tests against the in-memory radio.
//!
//! Time is paused, so timeouts and recovery polls run instantly and in a
//! deterministic order.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use ble_scan_manager::{
    AdapterState, BleManager, DiscoveryReport, Error, ManagerConfig, MockRadio,
    PeripheralAddress, ScanEvent, ScanMode, ScanOptions, ScanPhase, ScanRequest, ScanVariant,
};

async fn setup(radio: MockRadio) -> (BleManager, Arc<MockRadio>, broadcast::Receiver<ScanEvent>) {
    let radio = Arc::new(radio);
    let manager = BleManager::with_radio(radio.clone(), ManagerConfig::default())
        .await
        .unwrap();
    let events = manager.subscribe();
    (manager, radio, events)
}

fn drain(events: &mut broadcast::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

fn stopped_count(events: &[ScanEvent]) -> usize {
    events
        .iter()
        .filter(|event| **event == ScanEvent::ScanStopped)
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_timed_scan_stops_once() {
    for radio in [MockRadio::new(), MockRadio::legacy()] {
        let (manager, radio, mut events) = setup(radio).await;

        manager.scan(ScanRequest::new().duration_secs(5)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(stopped_count(&drain(&mut events)), 1);
        assert_eq!(radio.start_requests().len(), 1);
        assert_eq!(radio.stop_count(), 1);
        assert_eq!(manager.phase(), ScanPhase::Idle);
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_then_rescan_fences_old_timer() {
    let (manager, radio, mut events) = setup(MockRadio::new()).await;

    manager.scan(ScanRequest::new().duration_secs(10)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    manager.stop_scan().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    manager.scan(ScanRequest::new().duration_secs(5)).await.unwrap();

    // t = 6.5: second session still running
    tokio::time::sleep(Duration::from_millis(4500)).await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(manager.phase(), ScanPhase::Scanning);

    // t = 7.5: second session timed out
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(drain(&mut events), vec![ScanEvent::ScanStopped]);

    // t = 12.5: first session's timer came due and did nothing
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(radio.stop_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rescan_replaces_running_scan() {
    let (manager, radio, mut events) = setup(MockRadio::new()).await;

    manager.scan(ScanRequest::new().duration_secs(3)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    manager.scan(ScanRequest::new().duration_secs(3)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(stopped_count(&drain(&mut events)), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(stopped_count(&drain(&mut events)), 1);
    assert_eq!(radio.start_requests().len(), 2);
    assert_eq!(radio.stop_count(), 1);
}

#[tokio::test]
async fn test_duplicate_discovery_updates_in_place() {
    let (manager, radio, mut events) = setup(MockRadio::new()).await;
    let address = PeripheralAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();

    manager.scan(ScanRequest::new()).await.unwrap();
    radio.discover(DiscoveryReport::new(address, -60));
    radio.discover(DiscoveryReport::new(address, -70));

    for expected in [-60, -70] {
        match events.recv().await.unwrap() {
            ScanEvent::PeripheralDiscovered { rssi, .. } => assert_eq!(rssi, expected),
            other => panic!("unexpected event {:?}", other),
        }
    }

    let peripherals = manager.discovered_peripherals();
    assert_eq!(peripherals.len(), 1);
    assert_eq!(peripherals[0].address, address);
    assert_eq!(peripherals[0].rssi, -70);
}

#[tokio::test]
async fn test_new_scan_prunes_disconnected_peripherals() {
    let (manager, radio, mut events) = setup(MockRadio::new()).await;
    let kept = PeripheralAddress::new([1, 2, 3, 4, 5, 6]);
    let dropped = PeripheralAddress::new([6, 5, 4, 3, 2, 1]);

    radio.discover(DiscoveryReport::new(kept, -50));
    radio.discover(DiscoveryReport::new(dropped, -50));
    events.recv().await.unwrap();
    events.recv().await.unwrap();
    manager
        .set_connection_state(&kept.to_string(), ble_scan_manager::ConnectionState::Connected)
        .unwrap();

    manager.scan(ScanRequest::new()).await.unwrap();

    let addresses: Vec<_> = manager
        .discovered_peripherals()
        .into_iter()
        .map(|p| p.address)
        .collect();
    assert_eq!(addresses, vec![kept]);
}

#[tokio::test]
async fn test_scan_and_stop_with_adapter_off() {
    let (manager, radio, _events) = setup(MockRadio::new()).await;
    radio.set_power_state(AdapterState::Off);

    assert!(matches!(
        manager.scan(ScanRequest::new()).await,
        Err(Error::AdapterDisabled)
    ));
    assert!(matches!(manager.stop_scan().await, Err(Error::AdapterDisabled)));
    assert!(radio.start_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_with_adapter_off_is_silent() {
    let (manager, radio, mut events) = setup(MockRadio::new()).await;

    manager.scan(ScanRequest::new().duration_secs(5)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    radio.set_power_state(AdapterState::Off);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let events = drain(&mut events);
    assert_eq!(stopped_count(&events), 0);
    assert_eq!(
        events,
        vec![ScanEvent::AdapterStateChanged {
            state: AdapterState::Off
        }]
    );
    assert_eq!(radio.stop_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_modern_failure_recovers_with_same_parameters() {
    let (manager, radio, mut events) = setup(MockRadio::new()).await;
    assert_eq!(manager.variant(), ScanVariant::Modern);
    radio.fail_next_starts(1);

    let options = ScanOptions::new().scan_mode(ScanMode::Balanced);
    tokio_test::assert_ok!(manager.scan_with(&["180D"], 0, false, options).await);
    tokio::time::sleep(Duration::from_secs(10)).await;

    let cycle = vec![
        AdapterState::TurningOff,
        AdapterState::Off,
        AdapterState::TurningOn,
        AdapterState::On,
    ];
    assert_eq!(radio.power_history(), cycle);

    let observed: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            ScanEvent::AdapterStateChanged { state } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(observed, cycle);

    let starts = radio.start_requests();
    assert_eq!(starts.len(), 2);
    assert_eq!(starts[0], starts[1]);
    assert_eq!(
        starts[1].services,
        vec![ble_scan_manager::ble::uuids::HEART_RATE_SERVICE_UUID]
    );
    assert_eq!(starts[1].tuning, Some(options));
    assert_eq!(manager.phase(), ScanPhase::Scanning);
}

#[tokio::test(start_paused = true)]
async fn test_reported_failure_mid_scan_resumes_timed_scan() {
    let (manager, radio, mut events) = setup(MockRadio::new()).await;

    manager.scan(ScanRequest::new().duration_secs(20)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    radio.report_scan_failure(2);

    // Recovery takes 3 s; the resumed scan runs its own 20 s from there.
    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(stopped_count(&drain(&mut events)), 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(stopped_count(&drain(&mut events)), 1);
    assert_eq!(radio.start_requests().len(), 2);
    assert_eq!(radio.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_legacy_does_not_recover() {
    let (manager, radio, _events) = setup(MockRadio::legacy()).await;
    manager.scan(ScanRequest::new()).await.unwrap();

    radio.report_scan_failure(2);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(radio.power_history().is_empty());
    assert_eq!(radio.start_requests().len(), 1);
}
