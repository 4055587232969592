//! Core traits for serial port abstraction.
//!
//! `SerialPortAdapter` is one open device handle; `PortDriver` is the
//! capability that turns a device path plus [`LineSettings`] into such a
//! handle. Real hardware and the in-memory mock both sit behind these traits.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Line settings applied to a device when it is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSettings {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits per character.
    pub data_bits: DataBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// How long a read waits for the first byte.
    pub read_timeout: Duration,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// DSR/DTR handshaking requested.
    pub dsr_dtr: bool,
}

/// Device defaults: 9600 8N1, half-second read timeout, no flow control.
impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout: Duration::from_millis(500),
            flow_control: FlowControl::None,
            dsr_dtr: false,
        }
    }
}

impl std::fmt::Display for LineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.baud_rate,
            self.data_bits.count(),
            self.parity.symbol(),
            self.stop_bits
        )?;
        match self.flow_control {
            FlowControl::Hardware => write!(f, " RTS/CTS")?,
            FlowControl::Software => write!(f, " Xon/Xoff")?,
            FlowControl::None => {}
        }
        if self.dsr_dtr {
            write!(f, " DSR/DTR")?;
        }
        Ok(())
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    /// Map a raw bit count; only 5 through 8 exist on a UART.
    pub fn from_count(bits: u8) -> Option<Self> {
        match bits {
            5 => Some(Self::Five),
            6 => Some(Self::Six),
            7 => Some(Self::Seven),
            8 => Some(Self::Eight),
            _ => None,
        }
    }

    pub fn count(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

/// Parity checking modes.
///
/// Accepts both the long names and the single-letter forms (`"N"`, `"E"`, ...)
/// commonly found in serial settings strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[serde(alias = "N", alias = "n")]
    None,
    #[serde(alias = "O", alias = "o")]
    Odd,
    #[serde(alias = "E", alias = "e")]
    Even,
    #[serde(alias = "M", alias = "m")]
    Mark,
    #[serde(alias = "S", alias = "s")]
    Space,
}

impl Parity {
    fn symbol(self) -> char {
        match self {
            Self::None => 'N',
            Self::Odd => 'O',
            Self::Even => 'E',
            Self::Mark => 'M',
            Self::Space => 'S',
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl StopBits {
    /// Map a numeric stop bit count (1, 1.5 or 2).
    pub fn from_count(bits: f32) -> Option<Self> {
        if bits == 1.0 {
            Some(Self::One)
        } else if bits == 1.5 {
            Some(Self::OnePointFive)
        } else if bits == 2.0 {
            Some(Self::Two)
        } else {
            None
        }
    }
}

impl std::fmt::Display for StopBits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::One => write!(f, "1"),
            Self::OnePointFive => write!(f, "1.5"),
            Self::Two => write!(f, "2"),
        }
    }
}

/// Trait for serial port I/O operations.
///
/// This trait abstracts over synchronous serial port operations, allowing both
/// real hardware ports and mock implementations for testing.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Blocks until at least one byte arrives or the read timeout elapses, in
    /// which case `PortError::Timeout` is returned.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Set the read/write timeout for this port.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Drive the RTS control line.
    fn write_request_to_send(&mut self, level: bool) -> Result<(), PortError>;

    /// Drive the DTR control line.
    fn write_data_terminal_ready(&mut self, level: bool) -> Result<(), PortError>;

    /// Open a second handle to the same device.
    ///
    /// Used to give a reader and a writer independent handles so neither
    /// waits on the other's blocking call.
    fn try_clone(&self) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}

/// Capability to open serial devices.
pub trait PortDriver: Send + Sync + std::fmt::Debug {
    /// Open `path` with the given settings.
    fn open(
        &self,
        path: &str,
        settings: &LineSettings,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError>;

    /// Alternate descriptor tried once when opening `port_id` directly fails.
    fn fallback_path(&self, port_id: &str) -> String {
        platform_device_path(port_id)
    }
}

/// Fully-qualified device path for a bare port name.
///
/// `ttyUSB0` becomes `/dev/ttyUSB0` on Unix and `COM12` becomes `\\.\COM12`
/// on Windows. Already-qualified paths are returned unchanged.
pub fn platform_device_path(port_id: &str) -> String {
    #[cfg(windows)]
    {
        if port_id.starts_with(r"\\.\") {
            port_id.to_string()
        } else {
            format!(r"\\.\{port_id}")
        }
    }

    #[cfg(not(windows))]
    {
        if port_id.starts_with('/') {
            port_id.to_string()
        } else {
            format!("/dev/{port_id}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = LineSettings::default();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.stop_bits, StopBits::One);
        assert_eq!(settings.read_timeout, Duration::from_millis(500));
        assert_eq!(settings.flow_control, FlowControl::None);
        assert!(!settings.dsr_dtr);
    }

    #[test]
    fn test_settings_display() {
        let mut settings = LineSettings::default();
        assert_eq!(settings.to_string(), "9600,8,N,1");

        settings.parity = Parity::Even;
        settings.stop_bits = StopBits::OnePointFive;
        settings.flow_control = FlowControl::Hardware;
        assert_eq!(settings.to_string(), "9600,8,E,1.5 RTS/CTS");
    }

    #[test]
    fn test_data_bits_from_count() {
        assert_eq!(DataBits::from_count(7), Some(DataBits::Seven));
        assert_eq!(DataBits::from_count(4), None);
        assert_eq!(DataBits::from_count(9), None);
    }

    #[test]
    fn test_stop_bits_from_count() {
        assert_eq!(StopBits::from_count(1.5), Some(StopBits::OnePointFive));
        assert_eq!(StopBits::from_count(2.0), Some(StopBits::Two));
        assert_eq!(StopBits::from_count(3.0), None);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_platform_device_path() {
        assert_eq!(platform_device_path("ttyUSB0"), "/dev/ttyUSB0");
        assert_eq!(platform_device_path("/dev/ttyS1"), "/dev/ttyS1");
    }
}
