//! Relay pairs: source endpoint -> reader -> channel -> writer -> destination.
//!
//! ```text
//!  EndpointRegistry ──acquire──┐
//!                              v
//!  source ──read──> reader ──push──> Channel ──pop──> writer ──write──> destination
//! ```
//!
//! A pair moves `Unconfigured -> Ready -> Running -> Stopped`. `Stopped` is
//! terminal: restarting a link means building a new pair.

use crate::channel::Channel;
use crate::endpoint::{Endpoint, EndpointConfig};
use crate::error::{RelayError, RelayResult};
use crate::handler::{RelayHandler, RelayMode};
use crate::registry::EndpointRegistry;
use crate::worker::{DirectionalWorker, WorkerExit, DEFAULT_READ_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Default channel bound, in chunks.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// What a pair relays, and in which mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySetup {
    /// Relay mode name; empty means `"direct"`.
    pub mode: String,
    pub source: EndpointConfig,
    pub destination: EndpointConfig,
}

impl RelaySetup {
    pub fn direct(source: EndpointConfig, destination: EndpointConfig) -> Self {
        Self {
            mode: "direct".to_string(),
            source,
            destination,
        }
    }

    /// The same link in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            mode: self.mode.clone(),
            source: self.destination.clone(),
            destination: self.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Unconfigured,
    Ready,
    Running,
    Stopped,
}

/// Outcome of [`RelayPair::stop`].
#[derive(Debug)]
pub struct StopReport {
    pub reader: WorkerExit,
    pub writer: WorkerExit,
    /// Bytes written to the destination over the pair's lifetime.
    pub bytes_relayed: u64,
}

impl StopReport {
    /// Whether either worker ended on an error or panic.
    pub fn failed(&self) -> bool {
        self.reader.is_failure() || self.writer.is_failure()
    }
}

#[derive(Debug)]
pub struct RelayPair {
    registry: Arc<EndpointRegistry>,
    channel_capacity: usize,
    read_chunk_size: usize,
    state: PairState,
    handler: Option<Arc<dyn RelayHandler>>,
    source: Option<Arc<Endpoint>>,
    destination: Option<Arc<Endpoint>>,
    channel: Option<Arc<Channel>>,
    reader: Option<DirectionalWorker>,
    writer: Option<DirectionalWorker>,
}

impl RelayPair {
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self {
            registry,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            state: PairState::Unconfigured,
            handler: None,
            source: None,
            destination: None,
            channel: None,
            reader: None,
            writer: None,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Validate the mode and acquire both endpoints.
    ///
    /// If the destination cannot be acquired, the source is released again
    /// and the pair stays `Unconfigured`. Configuring a `Ready` pair releases
    /// its current endpoints first.
    pub fn configure(&mut self, setup: &RelaySetup) -> RelayResult<()> {
        match self.state {
            PairState::Unconfigured => {}
            PairState::Ready => {
                self.release_endpoints();
                self.state = PairState::Unconfigured;
            }
            PairState::Running | PairState::Stopped => {
                return Err(RelayError::invalid_state("configure", self.state));
            }
        }

        let mode = RelayMode::parse(&setup.mode)?;
        let source = self
            .registry
            .acquire(&setup.source.port_id, &setup.source)?;
        let destination = match self
            .registry
            .acquire(&setup.destination.port_id, &setup.destination)
        {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(port = source.port_id(), error = %e, "destination unavailable, releasing source");
                self.registry.release(source.port_id());
                return Err(e);
            }
        };

        info!(
            source = source.port_id(),
            destination = destination.port_id(),
            ?mode,
            "relay pair configured"
        );
        self.handler = Some(mode.handler());
        self.source = Some(source);
        self.destination = Some(destination);
        self.state = PairState::Ready;
        Ok(())
    }

    /// Wire reader(source) -> channel -> writer(destination) and start both.
    pub fn start(&mut self) -> RelayResult<()> {
        if self.state != PairState::Ready {
            return Err(RelayError::invalid_state("start", self.state));
        }
        let (source, destination, handler) = match (&self.source, &self.destination, &self.handler)
        {
            (Some(s), Some(d), Some(h)) => (s.clone(), d.clone(), h.clone()),
            _ => return Err(RelayError::invalid_state("start", self.state)),
        };

        let channel = Arc::new(Channel::new(self.channel_capacity));
        let mut writer = DirectionalWorker::writer(destination.clone(), channel.clone());
        let mut reader =
            DirectionalWorker::reader(source.clone(), channel.clone(), handler, self.read_chunk_size);

        if let Err(e) = writer.start() {
            self.abort_start();
            return Err(e);
        }
        if let Err(e) = reader.start() {
            writer.stop();
            self.abort_start();
            return Err(e);
        }

        info!(
            source = source.port_id(),
            destination = destination.port_id(),
            "relay pair running"
        );
        self.channel = Some(channel);
        self.writer = Some(writer);
        self.reader = Some(reader);
        self.state = PairState::Running;
        Ok(())
    }

    fn abort_start(&mut self) {
        self.release_endpoints();
        self.state = PairState::Stopped;
    }

    /// Stop the writer, then the reader, then release both endpoints.
    ///
    /// The writer goes first: closing the channel unblocks it immediately,
    /// and the reader then returns within one read timeout. Calling `stop` on
    /// a pair that never ran just releases whatever it acquired.
    pub fn stop(&mut self) -> StopReport {
        if self.state == PairState::Stopped {
            return StopReport {
                reader: WorkerExit::AlreadyStopped,
                writer: WorkerExit::AlreadyStopped,
                bytes_relayed: 0,
            };
        }

        let mut bytes_relayed = 0;
        let writer = match self.writer.take() {
            Some(mut worker) => {
                let exit = worker.stop();
                bytes_relayed = worker.bytes_transferred();
                exit
            }
            None => WorkerExit::NeverStarted,
        };
        let reader = self
            .reader
            .take()
            .map_or(WorkerExit::NeverStarted, |mut worker| worker.stop());
        self.channel = None;

        let ports = (
            self.source.as_ref().map(|e| e.port_id().to_string()),
            self.destination.as_ref().map(|e| e.port_id().to_string()),
        );
        self.release_endpoints();
        self.state = PairState::Stopped;

        let report = StopReport {
            reader,
            writer,
            bytes_relayed,
        };
        if report.failed() {
            warn!(source = ?ports.0, destination = ?ports.1, ?report, "relay pair stopped after failure");
        } else {
            info!(source = ?ports.0, destination = ?ports.1, bytes = bytes_relayed, "relay pair stopped");
        }
        report
    }

    fn release_endpoints(&mut self) {
        if let Some(source) = self.source.take() {
            self.registry.release(source.port_id());
        }
        if let Some(destination) = self.destination.take() {
            self.registry.release(destination.port_id());
        }
    }

    /// Running, with both workers still alive.
    pub fn is_running(&self) -> bool {
        self.state == PairState::Running && self.workers_alive()
    }

    /// Running, but a worker has already ended on its own.
    pub fn has_failed(&self) -> bool {
        self.state == PairState::Running && !self.workers_alive()
    }

    fn workers_alive(&self) -> bool {
        matches!(
            (&self.reader, &self.writer),
            (Some(r), Some(w)) if r.is_alive() && w.is_alive()
        )
    }

    pub fn state(&self) -> PairState {
        self.state
    }

    pub fn source_port(&self) -> Option<&str> {
        self.source.as_deref().map(Endpoint::port_id)
    }

    pub fn destination_port(&self) -> Option<&str> {
        self.destination.as_deref().map(Endpoint::port_id)
    }

    /// Bytes the writer has delivered so far.
    pub fn bytes_relayed(&self) -> u64 {
        self.writer
            .as_ref()
            .map_or(0, DirectionalWorker::bytes_transferred)
    }
}

impl Drop for RelayPair {
    fn drop(&mut self) {
        if matches!(self.state, PairState::Ready | PairState::Running) {
            self.stop();
        }
    }
}
