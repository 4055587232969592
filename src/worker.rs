//! Directional workers: one background thread moving bytes one way.
//!
//! A reader drains an [`Endpoint`] into a [`Channel`]; a writer drains the
//! channel into an endpoint. Each worker goes `Idle -> Running -> Stopping ->
//! Stopped` and never restarts.
//!
//! Cancellation is cooperative. `stop()` clears the `alive` flag; a reader
//! notices on its next read timeout, a writer is woken by closing the
//! channel. Whichever way a worker's thread ends, it clears its own flag and
//! closes the channel so the worker on the other side winds down too.

use crate::channel::Channel;
use crate::endpoint::Endpoint;
use crate::error::{RelayError, RelayResult};
use crate::handler::RelayHandler;
use crate::port::PortError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Default number of bytes requested per device read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Reader,
    Writer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reader => write!(f, "reader"),
            Self::Writer => write!(f, "writer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// How a worker's thread ended, as observed by `stop()`.
#[derive(Debug)]
pub enum WorkerExit {
    /// `stop()` was called on a worker that was never started.
    NeverStarted,
    /// The loop ended because it was asked to, or its peer went away.
    Clean,
    /// The loop ended on a device error.
    Failed(PortError),
    /// The thread panicked.
    Panicked,
    /// `stop()` had already been called.
    AlreadyStopped,
}

impl WorkerExit {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked)
    }
}

/// Clears the liveness flag and closes the channel however the loop ends,
/// unwinding included.
struct ExitGuard {
    alive: Arc<AtomicBool>,
    channel: Arc<Channel>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
        self.channel.close();
    }
}

/// Everything the background thread needs, moved into it at start.
struct RoleLoop {
    role: Role,
    endpoint: Arc<Endpoint>,
    channel: Arc<Channel>,
    handler: Arc<dyn RelayHandler>,
    chunk_size: usize,
    alive: Arc<AtomicBool>,
    bytes: Arc<AtomicU64>,
}

impl RoleLoop {
    fn run(self) -> Result<(), PortError> {
        let _guard = ExitGuard {
            alive: self.alive.clone(),
            channel: self.channel.clone(),
        };
        debug!(role = %self.role, port = self.endpoint.port_id(), "worker loop entered");
        let result = match self.role {
            Role::Reader => self.read_loop(),
            Role::Writer => self.write_loop(),
        };
        match &result {
            Ok(()) => debug!(role = %self.role, port = self.endpoint.port_id(), "worker loop exited"),
            Err(e) => warn!(role = %self.role, port = self.endpoint.port_id(), error = %e, "worker loop failed"),
        }
        result
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn read_loop(&self) -> Result<(), PortError> {
        let mut buffer = vec![0u8; self.chunk_size];
        while self.is_alive() && !self.channel.is_closed() {
            let n = self.endpoint.read(&mut buffer)?;
            if n == 0 {
                continue;
            }
            let chunk = self.handler.transform(buffer[..n].to_vec());
            trace!(port = self.endpoint.port_id(), bytes = n, "read chunk");
            if self.channel.push(chunk).is_err() {
                break;
            }
            self.bytes.fetch_add(n as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    fn write_loop(&self) -> Result<(), PortError> {
        while self.is_alive() {
            let Some(chunk) = self.channel.pop() else {
                break;
            };
            // Woken for shutdown: whatever is still queued is discarded.
            if !self.is_alive() {
                break;
            }
            if chunk.is_empty() {
                continue;
            }
            self.endpoint.write_all(&chunk)?;
            trace!(port = self.endpoint.port_id(), bytes = chunk.len(), "wrote chunk");
            self.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// A reader or writer bound to one endpoint and one channel.
#[derive(Debug)]
pub struct DirectionalWorker {
    role: Role,
    endpoint: Arc<Endpoint>,
    channel: Arc<Channel>,
    handler: Arc<dyn RelayHandler>,
    chunk_size: usize,
    alive: Arc<AtomicBool>,
    bytes: Arc<AtomicU64>,
    state: WorkerState,
    handle: Option<JoinHandle<Result<(), PortError>>>,
}

impl DirectionalWorker {
    /// A worker that reads `endpoint`, transforms with `handler`, and pushes
    /// into `channel`.
    pub fn reader(
        endpoint: Arc<Endpoint>,
        channel: Arc<Channel>,
        handler: Arc<dyn RelayHandler>,
        chunk_size: usize,
    ) -> Self {
        Self::new(Role::Reader, endpoint, channel, handler, chunk_size)
    }

    /// A worker that pops from `channel` and writes to `endpoint`.
    pub fn writer(endpoint: Arc<Endpoint>, channel: Arc<Channel>) -> Self {
        let handler: Arc<dyn RelayHandler> = Arc::new(crate::handler::DirectRelay);
        Self::new(Role::Writer, endpoint, channel, handler, DEFAULT_READ_CHUNK_SIZE)
    }

    fn new(
        role: Role,
        endpoint: Arc<Endpoint>,
        channel: Arc<Channel>,
        handler: Arc<dyn RelayHandler>,
        chunk_size: usize,
    ) -> Self {
        Self {
            role,
            endpoint,
            channel,
            handler,
            chunk_size: chunk_size.max(1),
            alive: Arc::new(AtomicBool::new(false)),
            bytes: Arc::new(AtomicU64::new(0)),
            state: WorkerState::Idle,
            handle: None,
        }
    }

    /// Launch the role loop on its own thread.
    ///
    /// Raising RTS/DTR is part of activation; a device that refuses is
    /// logged and relayed anyway.
    pub fn start(&mut self) -> RelayResult<()> {
        if self.state != WorkerState::Idle {
            return Err(RelayError::invalid_state("start worker", self.state));
        }

        self.alive.store(true, Ordering::Release);
        if let Err(e) = self.endpoint.assert_control_lines() {
            warn!(port = self.endpoint.port_id(), error = %e, "could not raise RTS/DTR");
        }

        let body = RoleLoop {
            role: self.role,
            endpoint: self.endpoint.clone(),
            channel: self.channel.clone(),
            handler: self.handler.clone(),
            chunk_size: self.chunk_size,
            alive: self.alive.clone(),
            bytes: self.bytes.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.role, self.endpoint.port_id()))
            .spawn(move || body.run());

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = WorkerState::Running;
                info!(role = %self.role, port = self.endpoint.port_id(), "worker started");
                Ok(())
            }
            Err(e) => {
                self.alive.store(false, Ordering::Release);
                self.state = WorkerState::Stopped;
                Err(RelayError::Spawn(e))
            }
        }
    }

    /// Ask the loop to finish and wait for the thread.
    ///
    /// A reader returns within one read timeout; a writer is woken by closing
    /// the channel. Safe to call on a worker that never started.
    pub fn stop(&mut self) -> WorkerExit {
        match self.state {
            WorkerState::Idle => {
                self.state = WorkerState::Stopped;
                return WorkerExit::NeverStarted;
            }
            WorkerState::Stopped => return WorkerExit::AlreadyStopped,
            WorkerState::Running | WorkerState::Stopping => {}
        }

        self.state = WorkerState::Stopping;
        self.alive.store(false, Ordering::Release);
        if self.role == Role::Writer {
            self.channel.close();
        }

        let exit = match self.handle.take().map(JoinHandle::join) {
            None | Some(Ok(Ok(()))) => WorkerExit::Clean,
            Some(Ok(Err(e))) => WorkerExit::Failed(e),
            Some(Err(_)) => WorkerExit::Panicked,
        };
        self.state = WorkerState::Stopped;
        info!(
            role = %self.role,
            port = self.endpoint.port_id(),
            bytes = self.bytes_transferred(),
            ?exit,
            "worker stopped"
        );
        exit
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Whether the loop is (still) meant to run.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Bytes read (reader) or written (writer) so far.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }
}

impl Drop for DirectionalWorker {
    fn drop(&mut self) {
        if matches!(self.state, WorkerState::Running | WorkerState::Stopping) {
            self.stop();
        }
    }
}
