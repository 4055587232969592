//! Port abstraction layer for serial communication.
//!
//! The relay engine only talks to devices through [`PortDriver`] and
//! [`SerialPortAdapter`], so real hardware and the in-memory mock are
//! interchangeable.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockDriver, MockSerialPort};
pub use sync_port::{SyncSerialPort, SystemDriver};
pub use traits::*;
