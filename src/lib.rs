//! Serial Relay Library
//!
//! Relays the byte stream read from one serial port to another.
//!
//! # Modules
//!
//! - `port`: serial driver abstraction, real and mock backends
//! - `endpoint`: one configured, open serial connection
//! - `registry`: table of open endpoints, one per port id
//! - `channel`: bounded chunk queue between a reader and a writer
//! - `handler`: pluggable transformation applied to relayed bytes
//! - `worker`: reader/writer threads and their lifecycle
//! - `relay`: relay pairs tying the above together
//! - `config`: configuration with TOML support
//! - `error`: engine error type
//!
//! # Example
//!
//! ```no_run
//! use serial_relay::{EndpointConfig, EndpointRegistry, RelayPair, RelaySetup, SystemDriver};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(EndpointRegistry::new(Arc::new(SystemDriver)));
//! let mut pair = RelayPair::new(registry.clone());
//! pair.configure(&RelaySetup::direct(
//!     EndpointConfig::new("/dev/ttyUSB0").with_baud_rate(9600),
//!     EndpointConfig::new("/dev/ttyUSB1").with_baud_rate(9600),
//! ))?;
//! pair.start()?;
//! // ...
//! pair.stop();
//! # Ok::<(), serial_relay::RelayError>(())
//! ```

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod port;
pub mod registry;
pub mod relay;
pub mod worker;

pub use channel::{Channel, ChannelClosed};
pub use endpoint::{Endpoint, EndpointConfig};
pub use error::{RelayError, RelayResult};
pub use handler::{DirectRelay, RelayHandler, RelayMode};
pub use port::{
    LineSettings, MockDriver, MockSerialPort, PortDriver, PortError, SerialPortAdapter,
    SystemDriver,
};
pub use registry::EndpointRegistry;
pub use relay::{PairState, RelayPair, RelaySetup, StopReport};
pub use worker::{DirectionalWorker, Role, WorkerExit, WorkerState};

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
