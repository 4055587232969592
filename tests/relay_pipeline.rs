//! End-to-end tests of relay pairs over mock devices.

mod common;

use common::{direct_setup, RelayHarness, DELIVERY_TIMEOUT, READ_TIMEOUT};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serial_relay::{PairState, PortError, RelayError, WorkerExit};
use std::thread;
use std::time::{Duration, Instant};

/// Scheduling allowance on top of one read timeout when measuring stop.
const STOP_SLACK: Duration = Duration::from_millis(30);

#[test]
fn test_bytes_reach_destination_and_ports_are_evicted() {
    let harness = RelayHarness::new();
    let source = harness.device("A");
    let destination = harness.device("B");
    let mut pair = harness.running_pair("A", "B");

    source.enqueue_read(&[0x01, 0x02, 0x03]);
    let received = destination.wait_for_written(3, DELIVERY_TIMEOUT);
    assert_eq!(received, vec![0x01, 0x02, 0x03]);

    let report = pair.stop();
    assert!(!report.failed());
    assert_eq!(report.bytes_relayed, 3);
    assert!(!harness.registry.contains("A"));
    assert!(!harness.registry.contains("B"));
    assert_eq!(pair.state(), PairState::Stopped);
}

#[test]
fn test_settings_reach_the_driver() {
    let harness = RelayHarness::new();
    let _pair = harness.running_pair("A", "B");

    let settings = harness.driver.last_settings("A").unwrap();
    assert_eq!(settings.baud_rate, 9600);
    assert_eq!(settings.read_timeout, READ_TIMEOUT);
}

#[test]
fn test_order_preserved_across_many_chunks() {
    let harness = RelayHarness::new();
    let source = harness.device("A");
    let destination = harness.device("B");
    let mut pair = harness.pair().with_channel_capacity(2).with_read_chunk_size(3);
    pair.configure(&direct_setup("A", "B")).unwrap();
    pair.start().unwrap();

    let expected: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    for chunk in expected.chunks(100) {
        source.enqueue_read(chunk);
    }

    let received = destination.wait_for_written(expected.len(), DELIVERY_TIMEOUT);
    assert_eq!(received, expected);
    pair.stop();
}

#[test]
fn test_stop_with_idle_link_is_bounded_by_read_timeout() {
    let harness = RelayHarness::new();
    let mut pair = harness.running_pair("A", "B");
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    let report = pair.stop();
    let elapsed = started.elapsed();

    assert!(matches!(report.writer, WorkerExit::Clean));
    assert!(matches!(report.reader, WorkerExit::Clean));
    assert!(elapsed < READ_TIMEOUT + STOP_SLACK, "stop took {elapsed:?}");
}

#[test]
fn test_sub_nanosecond_read_timeout_is_rejected() {
    let harness = RelayHarness::new();
    let mut setup = direct_setup("A", "B");
    setup.source.read_timeout_seconds = 1e-12;

    let mut pair = harness.pair();
    let result = pair.configure(&setup);

    assert!(matches!(result, Err(RelayError::InvalidConfig(_))));
    assert!(harness.driver.open_attempts().is_empty());
    assert!(harness.registry.is_empty());
}

#[test]
fn test_restart_after_stop_is_rejected() {
    let harness = RelayHarness::new();
    let mut pair = harness.running_pair("A", "B");
    pair.stop();

    assert!(matches!(
        pair.start(),
        Err(RelayError::InvalidState { .. })
    ));
    assert!(matches!(
        pair.configure(&direct_setup("A", "B")),
        Err(RelayError::InvalidState { .. })
    ));
}

#[test]
fn test_destination_write_failure_stops_pair() {
    let harness = RelayHarness::new();
    let source = harness.device("A");
    harness.device("B").set_fail_writes(true);
    let mut pair = harness.running_pair("A", "B");

    source.enqueue_read(b"boom");
    let deadline = Instant::now() + DELIVERY_TIMEOUT;
    while !pair.has_failed() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(pair.has_failed());
    assert!(!pair.is_running());

    // The reader follows its writer down within a read timeout.
    let report = pair.stop();
    assert!(report.failed());
    assert!(matches!(report.writer, WorkerExit::Failed(PortError::Io(_))));
    assert!(matches!(report.reader, WorkerExit::Clean));
    assert!(harness.registry.is_empty());
}

#[test]
fn test_source_closed_out_of_band_stops_pair() {
    let harness = RelayHarness::new();
    let mut pair = harness.running_pair("A", "B");

    harness.registry.get("A").unwrap().close();
    let deadline = Instant::now() + DELIVERY_TIMEOUT;
    while !pair.has_failed() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    let report = pair.stop();
    assert!(matches!(report.reader, WorkerExit::Failed(PortError::NotOpen)));
    assert!(harness.registry.is_empty());
}

#[test]
fn test_duplex_pairs_share_endpoints() {
    let harness = RelayHarness::new();
    let a = harness.device("A");
    let b = harness.device("B");
    let mut forward = harness.running_pair("A", "B");
    let mut backward = harness.running_pair("B", "A");

    assert_eq!(harness.registry.len(), 2);
    assert!(forward.is_running() && backward.is_running());

    a.enqueue_read(b"ping");
    b.enqueue_read(b"pong");
    assert_eq!(b.wait_for_written(4, DELIVERY_TIMEOUT), b"ping");
    assert_eq!(a.wait_for_written(4, DELIVERY_TIMEOUT), b"pong");

    backward.stop();
    forward.stop();
    assert!(harness.registry.is_empty());
}

#[test]
fn test_unavailable_source_leaves_nothing_behind() {
    let harness = RelayHarness::new();
    harness.driver.set_unavailable("A");
    let mut pair = harness.pair();

    let result = pair.configure(&direct_setup("A", "B"));
    assert!(matches!(result, Err(RelayError::DeviceUnavailable { .. })));
    assert_eq!(pair.state(), PairState::Unconfigured);
    assert!(harness.registry.is_empty());
    assert_eq!(harness.driver.open_attempts(), vec!["A", "loop://A"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_destination_sees_source_bytes_in_order(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..16)
    ) {
        let harness = RelayHarness::new();
        let source = harness.device("A");
        let destination = harness.device("B");
        let mut pair = harness.running_pair("A", "B");

        for chunk in &chunks {
            source.enqueue_read(chunk);
        }
        let expected: Vec<u8> = chunks.concat();
        let received = destination.wait_for_written(expected.len(), DELIVERY_TIMEOUT);
        pair.stop();

        prop_assert_eq!(received, expected);
    }
}
