//! Registry behaviour under concurrent use.

mod common;

use common::{endpoint, RelayHarness};
use serial_relay::RelayError;
use std::sync::Arc;
use std::thread;

#[test]
fn test_concurrent_acquire_opens_port_once() {
    let harness = RelayHarness::new();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = harness.registry.clone();
            thread::spawn(move || registry.acquire("A", &endpoint("A")).unwrap())
        })
        .collect();
    let endpoints: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(endpoints.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(harness.driver.open_attempts(), vec!["A"]);
}

#[test]
fn test_stale_eviction_then_reopen() {
    let harness = RelayHarness::new();
    let first = harness.registry.acquire("A", &endpoint("A")).unwrap();
    first.close();

    assert!(matches!(
        harness.registry.acquire("A", &endpoint("A")),
        Err(RelayError::DeviceUnavailable { .. })
    ));
    assert!(!harness.registry.contains("A"));

    let second = harness.registry.acquire("A", &endpoint("A")).unwrap();
    assert!(second.is_open());
}

#[test]
fn test_release_all_closes_everything() {
    let harness = RelayHarness::new();
    let endpoints: Vec<_> = ["A", "B", "C"]
        .iter()
        .map(|id| harness.registry.acquire(id, &endpoint(id)).unwrap())
        .collect();

    harness.registry.release_all();

    assert!(harness.registry.is_empty());
    assert!(endpoints.iter().all(|e| !e.is_open()));
}

#[test]
fn test_missing_port_id_is_invalid_config() {
    let harness = RelayHarness::new();
    assert!(matches!(
        harness.registry.acquire("  ", &endpoint("")),
        Err(RelayError::InvalidConfig(_))
    ));
    assert!(harness.driver.open_attempts().is_empty());
}

#[test]
fn test_setup_parses_from_json() {
    let setup: serial_relay::RelaySetup = serde_json::from_str(
        r#"{
            "mode": "direct",
            "source": {"port_id": "A", "baud_rate": 9600, "parity": "none", "stop_bits": 1.5},
            "destination": {"port_id": "B", "read_timeout_seconds": 0.05}
        }"#,
    )
    .unwrap();

    assert_eq!(setup.source.stop_bits, 1.5);
    assert_eq!(setup.destination.read_timeout_seconds, 0.05);
    assert_eq!(setup.source.resolve().unwrap().stop_bits, serial_relay::port::StopBits::OnePointFive);
}
