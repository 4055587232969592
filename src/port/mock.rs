//! Mock serial devices for testing.
//!
//! `MockSerialPort` simulates one device in memory: tests feed its incoming
//! stream with [`MockSerialPort::enqueue_read`] and inspect what the relay
//! wrote with [`MockSerialPort::written`]. Clones share the same device, the
//! way two OS handles to one tty do. `MockDriver` hands these ports out by
//! name and can be told to refuse opens.

use super::error::PortError;
use super::traits::{LineSettings, PortDriver, SerialPortAdapter};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// URL scheme used by [`MockDriver`] as its fallback descriptor.
pub const MOCK_FALLBACK_SCHEME: &str = "loop://";

#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes the device will hand to readers.
    read_queue: VecDeque<u8>,
    /// Every successful write, in order.
    write_log: Vec<Vec<u8>>,
    timeout: Duration,
    rts: bool,
    dtr: bool,
    fail_reads: bool,
    fail_writes: bool,
}

#[derive(Debug, Default)]
struct MockShared {
    state: Mutex<MockPortState>,
    readable: Condvar,
    written: Condvar,
}

/// In-memory serial device.
///
/// # Example
/// ```
/// use serial_relay::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hello");
///
/// let mut buffer = [0u8; 16];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello");
///
/// port.write_bytes(b"World").unwrap();
/// assert_eq!(port.written(), b"World");
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    shared: Arc<MockShared>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let shared = MockShared::default();
        shared.state.lock().timeout = Duration::from_millis(500);
        Self {
            name: name.into(),
            shared: Arc::new(shared),
        }
    }

    /// Make bytes arrive on the device's incoming line.
    pub fn enqueue_read(&self, data: &[u8]) {
        let mut state = self.shared.state.lock();
        state.read_queue.extend(data);
        self.shared.readable.notify_all();
    }

    /// Get a copy of every chunk written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().write_log.clone()
    }

    /// All written bytes, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.shared.state.lock().write_log.concat()
    }

    /// Block until at least `len` bytes were written or `timeout` passes.
    ///
    /// Returns everything written so far either way.
    pub fn wait_for_written(&self, len: usize, timeout: Duration) -> Vec<u8> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            let total: usize = state.write_log.iter().map(Vec::len).sum();
            if total >= len {
                break;
            }
            if self.shared.written.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.write_log.concat()
    }

    /// Make every subsequent read fail with an I/O error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.shared.state.lock().fail_reads = fail;
        self.shared.readable.notify_all();
    }

    /// Make every subsequent write fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.state.lock().fail_writes = fail;
    }

    /// Current RTS line level.
    pub fn rts(&self) -> bool {
        self.shared.state.lock().rts
    }

    /// Current DTR line level.
    pub fn dtr(&self) -> bool {
        self.shared.state.lock().dtr
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.shared.state.lock().read_queue.len()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.shared.state.lock();
        if state.fail_writes {
            return Err(PortError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated write failure",
            )));
        }
        state.write_log.push(data.to_vec());
        self.shared.written.notify_all();
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.shared.state.lock();
        let deadline = Instant::now() + state.timeout;

        loop {
            if state.fail_reads {
                return Err(PortError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "simulated read failure",
                )));
            }
            if !state.read_queue.is_empty() {
                break;
            }
            if self
                .shared
                .readable
                .wait_until(&mut state, deadline)
                .timed_out()
                && state.read_queue.is_empty()
            {
                return Err(PortError::timeout(state.timeout));
            }
        }

        let n = buffer.len().min(state.read_queue.len());
        for (slot, byte) in buffer.iter_mut().zip(state.read_queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.shared.state.lock().timeout = timeout;
        Ok(())
    }

    fn write_request_to_send(&mut self, level: bool) -> Result<(), PortError> {
        self.shared.state.lock().rts = level;
        Ok(())
    }

    fn write_data_terminal_ready(&mut self, level: bool) -> Result<(), PortError> {
        self.shared.state.lock().dtr = level;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(self.clone()))
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

#[derive(Debug, Default)]
struct MockDriverState {
    ports: HashMap<String, MockSerialPort>,
    unavailable: HashSet<String>,
    failing_opens: HashMap<String, u32>,
    open_attempts: Vec<String>,
    last_settings: HashMap<String, LineSettings>,
}

/// Driver that opens [`MockSerialPort`]s by name.
///
/// The fallback descriptor for port `X` is `loop://X`; both forms resolve to
/// the same mock device.
#[derive(Debug, Default, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockDriverState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the device named `port_id`, created on first use.
    pub fn port(&self, port_id: &str) -> MockSerialPort {
        self.state
            .lock()
            .ports
            .entry(port_id.to_string())
            .or_insert_with(|| MockSerialPort::new(port_id))
            .clone()
    }

    /// Refuse every open of `port_id`, through either descriptor.
    pub fn set_unavailable(&self, port_id: &str) {
        self.state.lock().unavailable.insert(port_id.to_string());
    }

    /// Refuse the next `count` open attempts of `port_id`.
    pub fn fail_next_opens(&self, port_id: &str, count: u32) {
        self.state
            .lock()
            .failing_opens
            .insert(port_id.to_string(), count);
    }

    /// Every path passed to `open`, in order.
    pub fn open_attempts(&self) -> Vec<String> {
        self.state.lock().open_attempts.clone()
    }

    /// Settings used by the most recent successful open of `port_id`.
    pub fn last_settings(&self, port_id: &str) -> Option<LineSettings> {
        self.state.lock().last_settings.get(port_id).cloned()
    }
}

impl PortDriver for MockDriver {
    fn open(
        &self,
        path: &str,
        settings: &LineSettings,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        let port_id = path.strip_prefix(MOCK_FALLBACK_SCHEME).unwrap_or(path);
        let mut state = self.state.lock();
        state.open_attempts.push(path.to_string());

        if state.unavailable.contains(port_id) {
            return Err(PortError::not_found(path));
        }
        if let Some(remaining) = state.failing_opens.get_mut(port_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PortError::not_found(path));
            }
        }

        let mut port = state
            .ports
            .entry(port_id.to_string())
            .or_insert_with(|| MockSerialPort::new(port_id))
            .clone();
        port.set_timeout(settings.read_timeout)?;
        state
            .last_settings
            .insert(port_id.to_string(), settings.clone());
        Ok(Box::new(port))
    }

    fn fallback_path(&self, port_id: &str) -> String {
        format!("{MOCK_FALLBACK_SCHEME}{port_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_and_read() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"Hello");

        let mut buffer = [0u8; 10];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buffer[..n], b"Hello");
    }

    #[test]
    fn test_partial_read() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"Hello, World!");

        let mut buffer = [0u8; 5];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"Hello");
        assert_eq!(port.available_bytes(), 8);
    }

    #[test]
    fn test_empty_read_times_out() {
        let mut port = MockSerialPort::new("MOCK0");
        port.set_timeout(Duration::from_millis(20)).unwrap();

        let started = Instant::now();
        let mut buffer = [0u8; 10];
        let result = port.read_bytes(&mut buffer);

        assert!(matches!(result, Err(PortError::Timeout(d)) if d == Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_blocked_read_wakes_on_data() {
        let mut port = MockSerialPort::new("MOCK0");
        port.set_timeout(Duration::from_secs(5)).unwrap();
        let feeder = port.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            feeder.enqueue_read(b"x");
        });

        let mut buffer = [0u8; 4];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"x");
        handle.join().unwrap();
    }

    #[test]
    fn test_write_logging() {
        let mut port = MockSerialPort::new("MOCK0");
        port.write_bytes(b"Test1").unwrap();
        port.write_bytes(b"Test2").unwrap();

        let log = port.get_write_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], b"Test1");
        assert_eq!(port.written(), b"Test1Test2");
    }

    #[test]
    fn test_injected_failures() {
        let mut port = MockSerialPort::new("MOCK0");
        port.set_fail_writes(true);
        assert!(matches!(port.write_bytes(b"x"), Err(PortError::Io(_))));

        port.set_fail_reads(true);
        port.enqueue_read(b"x");
        let mut buffer = [0u8; 1];
        assert!(matches!(port.read_bytes(&mut buffer), Err(PortError::Io(_))));
    }

    #[test]
    fn test_clone_shares_device() {
        let port = MockSerialPort::new("MOCK0");
        let mut other = port.try_clone().unwrap();
        other.write_request_to_send(true).unwrap();
        other.write_bytes(b"ab").unwrap();

        assert!(port.rts());
        assert_eq!(port.written(), b"ab");
    }

    #[test]
    fn test_driver_fallback_resolves_same_device() {
        let driver = MockDriver::new();
        let settings = LineSettings::default();
        let fallback = driver.fallback_path("A");
        assert_eq!(fallback, "loop://A");

        let mut handle = driver.open(&fallback, &settings).unwrap();
        handle.write_bytes(b"z").unwrap();
        assert_eq!(driver.port("A").written(), b"z");
    }

    #[test]
    fn test_driver_failures() {
        let driver = MockDriver::new();
        let settings = LineSettings::default();

        driver.fail_next_opens("A", 1);
        assert!(driver.open("A", &settings).is_err());
        assert!(driver.open("A", &settings).is_ok());

        driver.set_unavailable("B");
        assert!(driver.open("B", &settings).is_err());
        assert!(driver.open("loop://B", &settings).is_err());

        assert_eq!(driver.open_attempts(), vec!["A", "A", "B", "loop://B"]);
    }
}
