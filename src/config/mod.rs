//! Configuration module for serial-relay.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_RELAY_CONFIG` environment variable (explicit path)
//! 2. `./serial-relay.toml` (current directory)
//! 3. `~/.config/serial-relay/config.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\serial-relay\config.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Example
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "compact"
//!
//! [relay]
//! channel_capacity = 64
//!
//! [[pair]]
//! mode = "direct"
//! source = { port_id = "/dev/ttyUSB0", baud_rate = 9600 }
//! destination = { port_id = "/dev/ttyUSB1", baud_rate = 9600 }
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, RelayConfig};
