//! Shared test utilities for relay integration tests.
//!
//! Every harness gets its own mock driver and registry, so tests never see
//! each other's ports.

#![allow(dead_code)]

use serial_relay::{
    EndpointConfig, EndpointRegistry, MockDriver, MockSerialPort, RelayPair, RelaySetup,
};
use std::sync::Arc;
use std::time::Duration;

/// Read timeout used by test endpoints; bounds stop latency.
pub const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Generous upper bound for bytes to cross a pair.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RelayHarness {
    pub driver: MockDriver,
    pub registry: Arc<EndpointRegistry>,
}

impl RelayHarness {
    pub fn new() -> Self {
        let driver = MockDriver::new();
        let registry = Arc::new(EndpointRegistry::new(Arc::new(driver.clone())));
        Self { driver, registry }
    }

    /// Handle to the mock device behind `port_id`.
    pub fn device(&self, port_id: &str) -> MockSerialPort {
        self.driver.port(port_id)
    }

    pub fn pair(&self) -> RelayPair {
        RelayPair::new(self.registry.clone())
    }

    /// A configured and started direct pair.
    pub fn running_pair(&self, source: &str, destination: &str) -> RelayPair {
        let mut pair = self.pair();
        pair.configure(&direct_setup(source, destination))
            .expect("configure relay pair");
        pair.start().expect("start relay pair");
        pair
    }
}

/// Endpoint config at 9600 baud with the short test read timeout.
pub fn endpoint(port_id: &str) -> EndpointConfig {
    EndpointConfig::new(port_id)
        .with_baud_rate(9600)
        .with_read_timeout(READ_TIMEOUT)
}

pub fn direct_setup(source: &str, destination: &str) -> RelaySetup {
    RelaySetup::direct(endpoint(source), endpoint(destination))
}
