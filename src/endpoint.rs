//! A single configured serial connection.
//!
//! An [`Endpoint`] is opened once, at construction, and can be closed once.
//! It never reopens: a new `Endpoint` has to be built for that.

use crate::error::{RelayError, RelayResult};
use crate::port::{
    DataBits, FlowControl, LineSettings, Parity, PortDriver, PortError, SerialPortAdapter,
    StopBits,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Requested settings for one endpoint.
///
/// Every field except `port_id` treats its falsy value (`0`, `false`, absent)
/// as "keep the device default". There is no way to ask for `baud_rate = 0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub port_id: String,
    pub baud_rate: u32,
    pub byte_size: u8,
    pub parity: Option<Parity>,
    pub stop_bits: f32,
    pub read_timeout_seconds: f64,
    pub software_flow_control: bool,
    pub hardware_flow_control: bool,
    pub dsr_dtr_flow_control: bool,
}

impl EndpointConfig {
    /// Config for `port_id` with every other field left to the device.
    pub fn new(port_id: impl Into<String>) -> Self {
        Self {
            port_id: port_id.into(),
            ..Self::default()
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Overlay the non-falsy fields onto the device defaults.
    pub fn resolve(&self) -> RelayResult<LineSettings> {
        let mut settings = LineSettings::default();

        if self.baud_rate != 0 {
            settings.baud_rate = self.baud_rate;
        }
        if self.byte_size != 0 {
            settings.data_bits = DataBits::from_count(self.byte_size).ok_or_else(|| {
                RelayError::invalid_config(format!(
                    "byte_size must be 5, 6, 7 or 8, got {}",
                    self.byte_size
                ))
            })?;
        }
        if let Some(parity) = self.parity {
            settings.parity = parity;
        }
        if self.stop_bits != 0.0 {
            settings.stop_bits = StopBits::from_count(self.stop_bits).ok_or_else(|| {
                RelayError::invalid_config(format!(
                    "stop_bits must be 1, 1.5 or 2, got {}",
                    self.stop_bits
                ))
            })?;
        }
        if self.read_timeout_seconds != 0.0 {
            if !self.read_timeout_seconds.is_finite() || self.read_timeout_seconds < 0.0 {
                return Err(RelayError::invalid_config(format!(
                    "read_timeout_seconds must be a positive number, got {}",
                    self.read_timeout_seconds
                )));
            }
            let timeout = Duration::try_from_secs_f64(self.read_timeout_seconds).map_err(|e| {
                RelayError::invalid_config(format!(
                    "read_timeout_seconds {} is out of range: {e}",
                    self.read_timeout_seconds
                ))
            })?;
            // A zero timeout turns the blocking read into a poll.
            if timeout.is_zero() {
                return Err(RelayError::invalid_config(format!(
                    "read_timeout_seconds {} rounds down to zero",
                    self.read_timeout_seconds
                )));
            }
            settings.read_timeout = timeout;
        }
        settings.flow_control = match (self.software_flow_control, self.hardware_flow_control) {
            (true, true) => {
                return Err(RelayError::invalid_config(
                    "software and hardware flow control are mutually exclusive",
                ))
            }
            (true, false) => FlowControl::Software,
            (false, true) => FlowControl::Hardware,
            (false, false) => FlowControl::None,
        };
        settings.dsr_dtr = self.dsr_dtr_flow_control;

        Ok(settings)
    }
}

/// An open serial device plus its configuration.
///
/// The device is held as two handles: the read half used by a reader worker
/// and the write half used by a writer worker. Each half has its own lock so
/// a blocking read never delays a write.
pub struct Endpoint {
    port_id: String,
    config: EndpointConfig,
    settings: LineSettings,
    rx: Mutex<Option<Box<dyn SerialPortAdapter>>>,
    tx: Mutex<Option<Box<dyn SerialPortAdapter>>>,
    open: AtomicBool,
}

impl Endpoint {
    /// Validate `config` and open the device.
    ///
    /// If the direct open fails, one more attempt is made with the driver's
    /// fallback descriptor before giving up with `DeviceUnavailable`, unless
    /// the fallback names the same path. A driver that rejects the settings
    /// outright yields `InvalidConfig` and is not retried.
    pub fn open(config: EndpointConfig, driver: &dyn PortDriver) -> RelayResult<Self> {
        let port_id = config.port_id.trim().to_string();
        if port_id.is_empty() {
            return Err(RelayError::invalid_config("port_id is required"));
        }
        let settings = config.resolve()?;

        let rx = match driver.open(&port_id, &settings) {
            Ok(port) => port,
            Err(PortError::Config(msg)) => return Err(RelayError::InvalidConfig(msg)),
            Err(primary) => {
                let fallback = driver.fallback_path(&port_id);
                if fallback == port_id {
                    debug!(port = %port_id, error = %primary, "no distinct fallback path, not retrying");
                    return Err(RelayError::unavailable(&port_id, primary));
                }
                debug!(port = %port_id, %fallback, error = %primary, "direct open failed, trying fallback");
                match driver.open(&fallback, &settings) {
                    Ok(port) => port,
                    Err(PortError::Config(msg)) => return Err(RelayError::InvalidConfig(msg)),
                    Err(secondary) => {
                        return Err(RelayError::unavailable(
                            &port_id,
                            format!("{primary}; fallback {fallback}: {secondary}"),
                        ))
                    }
                }
            }
        };
        let tx = rx
            .try_clone()
            .map_err(|e| RelayError::unavailable(&port_id, e))?;

        info!(port = %port_id, settings = %settings, "serial endpoint open");

        Ok(Self {
            port_id,
            config,
            settings,
            rx: Mutex::new(Some(rx)),
            tx: Mutex::new(Some(tx)),
            open: AtomicBool::new(true),
        })
    }

    pub fn port_id(&self) -> &str {
        &self.port_id
    }

    /// The configuration this endpoint was opened with.
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn settings(&self) -> &LineSettings {
        &self.settings
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close the device. Returns `false` if it was already closed.
    ///
    /// A read in progress finishes within one read timeout; every later
    /// read or write fails with `PortError::NotOpen`.
    pub fn close(&self) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.tx.lock().take();
        self.rx.lock().take();
        info!(port = %self.port_id, "serial endpoint closed");
        true
    }

    /// Read whatever is available, waiting at most the read timeout.
    ///
    /// `Ok(0)` means the timeout elapsed with nothing received.
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut rx = self.rx.lock();
        let port = rx.as_mut().ok_or(PortError::NotOpen)?;
        match port.read_bytes(buffer) {
            Err(e) if e.is_timeout() => Ok(0),
            other => other,
        }
    }

    /// Write the whole of `data`.
    pub fn write_all(&self, mut data: &[u8]) -> Result<(), PortError> {
        let mut tx = self.tx.lock();
        let port = tx.as_mut().ok_or(PortError::NotOpen)?;
        while !data.is_empty() {
            let n = port.write_bytes(data)?;
            if n == 0 {
                return Err(PortError::Io(std::io::ErrorKind::WriteZero.into()));
            }
            data = &data[n..];
        }
        Ok(())
    }

    /// Raise RTS and DTR.
    pub fn assert_control_lines(&self) -> Result<(), PortError> {
        let mut tx = self.tx.lock();
        let port = tx.as_mut().ok_or(PortError::NotOpen)?;
        port.write_request_to_send(true)?;
        port.write_data_terminal_ready(true)
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if self.is_open() {
            warn!(port = %self.port_id, "endpoint dropped while open");
            self.close();
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("port_id", &self.port_id)
            .field("settings", &self.settings)
            .field("is_open", &self.is_open())
            .finish()
    }
}
