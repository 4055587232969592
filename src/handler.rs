//! Relay handlers: what happens to bytes between the source and the channel.

use crate::error::{RelayError, RelayResult};
use std::sync::Arc;

/// Transformation applied by a reader worker to every chunk it reads.
///
/// Framing or parsing modes plug in here without touching the workers.
pub trait RelayHandler: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn transform(&self, chunk: Vec<u8>) -> Vec<u8>;
}

/// Passes bytes through unmodified.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectRelay;

impl RelayHandler for DirectRelay {
    fn name(&self) -> &str {
        "direct"
    }

    fn transform(&self, chunk: Vec<u8>) -> Vec<u8> {
        chunk
    }
}

/// Relay modes a pair can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    #[default]
    Direct,
}

impl RelayMode {
    /// Parse a mode name. Empty means direct.
    pub fn parse(mode: &str) -> RelayResult<Self> {
        let normalized = mode.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "direct" => Ok(Self::Direct),
            _ => Err(RelayError::UnsupportedMode(mode.to_string())),
        }
    }

    pub fn handler(self) -> Arc<dyn RelayHandler> {
        match self {
            Self::Direct => Arc::new(DirectRelay),
        }
    }
}
