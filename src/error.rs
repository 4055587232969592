use crate::port::PortError;
use thiserror::Error;

/// A specialized `Result` type for relay engine operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors surfaced by endpoints, the registry, workers and relay pairs.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A required field is missing or a value is out of range. Never retried.
    #[error("Invalid endpoint configuration: {0}")]
    InvalidConfig(String),

    /// The device could not be opened (primary and fallback both failed), or
    /// the registry found the port's endpoint closed underneath it.
    #[error("Device '{port_id}' is unavailable: {reason}")]
    DeviceUnavailable { port_id: String, reason: String },

    /// The relay mode is not one the engine knows how to build.
    #[error("Unsupported relay mode '{0}'")]
    UnsupportedMode(String),

    /// The operation is not valid in the component's current state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// The worker thread could not be spawned.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A device-level failure on an open endpoint.
    #[error(transparent)]
    Port(#[from] PortError),
}

impl RelayError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn unavailable(port_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::DeviceUnavailable {
            port_id: port_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_state(operation: &'static str, state: impl std::fmt::Debug) -> Self {
        Self::InvalidState {
            operation,
            state: format!("{state:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::unavailable("COM3", "no such device");
        assert_eq!(err.to_string(), "Device 'COM3' is unavailable: no such device");

        let err = RelayError::UnsupportedMode("framed".into());
        assert_eq!(err.to_string(), "Unsupported relay mode 'framed'");

        #[derive(Debug)]
        enum Phase {
            Stopped,
        }
        let err = RelayError::invalid_state("start", Phase::Stopped);
        assert_eq!(err.to_string(), "Cannot start while Stopped");
    }

    #[test]
    fn test_port_error_conversion() {
        let err: RelayError = PortError::NotOpen.into();
        assert!(matches!(err, RelayError::Port(PortError::NotOpen)));
        assert_eq!(err.to_string(), "Port is not open");
    }
}
