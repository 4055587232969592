//! Table of open endpoints, keyed by port id.
//!
//! The registry guarantees at most one live [`Endpoint`] per port id. It is
//! an ordinary value: create one, share it behind an `Arc`, and hand it to
//! every [`RelayPair`](crate::RelayPair) that should see the same ports.

use crate::endpoint::{Endpoint, EndpointConfig};
use crate::error::{RelayError, RelayResult};
use crate::port::PortDriver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct EndpointRegistry {
    driver: Arc<dyn PortDriver>,
    table: Mutex<HashMap<String, Arc<Endpoint>>>,
}

impl EndpointRegistry {
    pub fn new(driver: Arc<dyn PortDriver>) -> Self {
        Self {
            driver,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Return the open endpoint for `port_id`, opening it if needed.
    ///
    /// An endpoint that is already open is returned as-is; `config` is not
    /// compared against the settings it was opened with. An entry found
    /// closed is evicted and reported as `DeviceUnavailable`; the next call
    /// opens the port afresh.
    ///
    /// The table lock is held across the device open, so two callers can
    /// never open the same port concurrently.
    pub fn acquire(&self, port_id: &str, config: &EndpointConfig) -> RelayResult<Arc<Endpoint>> {
        let port_id = normalize(port_id);
        if port_id.is_empty() {
            return Err(RelayError::invalid_config("port_id is required"));
        }
        let config = EndpointConfig {
            port_id: port_id.to_string(),
            ..config.clone()
        };

        let mut table = self.table.lock();
        if let Some(existing) = table.get(port_id) {
            if existing.is_open() {
                if existing.config() != &config {
                    debug!(port = port_id, "port already open, requested settings ignored");
                }
                return Ok(existing.clone());
            }
            table.remove(port_id);
            info!(port = port_id, "evicted stale endpoint");
            return Err(RelayError::unavailable(port_id, "endpoint was closed"));
        }

        let endpoint = Arc::new(Endpoint::open(config, self.driver.as_ref())?);
        table.insert(port_id.to_string(), endpoint.clone());
        Ok(endpoint)
    }

    /// Look up `port_id` without opening anything. Closed entries are evicted.
    pub fn get(&self, port_id: &str) -> Option<Arc<Endpoint>> {
        let port_id = normalize(port_id);
        let mut table = self.table.lock();
        match table.get(port_id) {
            Some(endpoint) if endpoint.is_open() => Some(endpoint.clone()),
            Some(_) => {
                table.remove(port_id);
                info!(port = port_id, "evicted stale endpoint");
                None
            }
            None => None,
        }
    }

    /// Close and forget `port_id`. Returns whether it was registered.
    pub fn release(&self, port_id: &str) -> bool {
        let removed = self.table.lock().remove(normalize(port_id));
        match removed {
            Some(endpoint) => {
                endpoint.close();
                true
            }
            None => false,
        }
    }

    /// Close and forget every endpoint.
    pub fn release_all(&self) {
        let drained: Vec<_> = self.table.lock().drain().collect();
        for (_, endpoint) in drained {
            endpoint.close();
        }
    }

    pub fn contains(&self, port_id: &str) -> bool {
        self.table.lock().contains_key(normalize(port_id))
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    /// Registered port ids, sorted.
    pub fn port_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.table.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Table key for a port id; surrounding whitespace is not significant.
fn normalize(port_id: &str) -> &str {
    port_id.trim()
}

impl Drop for EndpointRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MockDriver;

    fn registry() -> (MockDriver, EndpointRegistry) {
        let driver = MockDriver::new();
        let registry = EndpointRegistry::new(Arc::new(driver.clone()));
        (driver, registry)
    }

    #[test]
    fn test_port_ids_are_trimmed_in_every_lookup() {
        let (driver, registry) = registry();
        let endpoint = registry.acquire(" A ", &EndpointConfig::new(" A ")).unwrap();
        assert_eq!(endpoint.port_id(), "A");
        assert_eq!(driver.open_attempts(), vec!["A"]);

        assert!(registry.contains(" A "));
        assert!(registry.get("A ").is_some());
        let again = registry.acquire("A", &EndpointConfig::new("A")).unwrap();
        assert!(Arc::ptr_eq(&endpoint, &again));

        assert!(registry.release(" A "));
        assert!(!endpoint.is_open());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_acquire_returns_same_instance() {
        let (driver, registry) = registry();
        let first = registry.acquire("A", &EndpointConfig::new("A")).unwrap();
        let second = registry.acquire("A", &EndpointConfig::new("A")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(driver.open_attempts(), vec!["A"]);
    }

    #[test]
    fn test_acquire_ignores_new_config_for_open_port() {
        let (_driver, registry) = registry();
        let first = registry
            .acquire("A", &EndpointConfig::new("A").with_baud_rate(9600))
            .unwrap();
        let second = registry
            .acquire("A", &EndpointConfig::new("A").with_baud_rate(115200))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.settings().baud_rate, 9600);
    }

    #[test]
    fn test_stale_endpoint_evicted() {
        let (_driver, registry) = registry();
        let endpoint = registry.acquire("A", &EndpointConfig::new("A")).unwrap();
        endpoint.close();

        let result = registry.acquire("A", &EndpointConfig::new("A"));
        assert!(matches!(result, Err(RelayError::DeviceUnavailable { .. })));
        assert!(!registry.contains("A"));

        let reopened = registry.acquire("A", &EndpointConfig::new("A")).unwrap();
        assert!(reopened.is_open());
        assert!(!Arc::ptr_eq(&endpoint, &reopened));
    }

    #[test]
    fn test_get_evicts_closed() {
        let (_driver, registry) = registry();
        assert!(registry.get("A").is_none());

        let endpoint = registry.acquire("A", &EndpointConfig::new("A")).unwrap();
        assert!(registry.get("A").is_some());

        endpoint.close();
        assert!(registry.get("A").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_open_not_registered() {
        let (driver, registry) = registry();
        driver.set_unavailable("A");

        assert!(registry.acquire("A", &EndpointConfig::new("A")).is_err());
        assert!(!registry.contains("A"));
    }

    #[test]
    fn test_release() {
        let (_driver, registry) = registry();
        let endpoint = registry.acquire("A", &EndpointConfig::new("A")).unwrap();

        assert!(registry.release("A"));
        assert!(!endpoint.is_open());
        assert!(!registry.release("A"));
    }

    #[test]
    fn test_release_all() {
        let (_driver, registry) = registry();
        let a = registry.acquire("A", &EndpointConfig::new("A")).unwrap();
        let b = registry.acquire("B", &EndpointConfig::new("B")).unwrap();
        assert_eq!(registry.port_ids(), vec!["A", "B"]);

        registry.release_all();
        assert!(registry.is_empty());
        assert!(!a.is_open());
        assert!(!b.is_open());
    }
}
