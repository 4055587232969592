//! Bounded FIFO of byte chunks between one reader worker and one writer.
//!
//! Shutdown is signalled with [`Channel::close`] rather than an in-band
//! marker, so an empty chunk stays an ordinary value.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Returned by [`Channel::push`] once the channel has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel closed")]
pub struct ChannelClosed;

#[derive(Debug, Default)]
struct Queue {
    chunks: VecDeque<Vec<u8>>,
    closed: bool,
}

#[derive(Debug)]
pub struct Channel {
    queue: Mutex<Queue>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl Channel {
    /// A channel holding at most `capacity` chunks (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue a chunk, waiting while the channel is full.
    pub fn push(&self, chunk: Vec<u8>) -> Result<(), ChannelClosed> {
        let mut queue = self.queue.lock();
        while !queue.closed && queue.chunks.len() >= self.capacity {
            self.not_full.wait(&mut queue);
        }
        if queue.closed {
            return Err(ChannelClosed);
        }
        queue.chunks.push_back(chunk);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the oldest chunk, waiting while the channel is empty.
    ///
    /// Chunks queued before [`close`](Self::close) are still handed out;
    /// `None` means the channel is closed and drained.
    pub fn pop(&self) -> Option<Vec<u8>> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(chunk) = queue.chunks.pop_front() {
                self.not_full.notify_one();
                return Some(chunk);
            }
            if queue.closed {
                return None;
            }
            self.not_empty.wait(&mut queue);
        }
    }

    /// Close the channel and wake every blocked caller. Idempotent.
    pub fn close(&self) {
        let mut queue = self.queue.lock();
        if !queue.closed {
            queue.closed = true;
            self.not_empty.notify_all();
            self.not_full.notify_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    pub fn len(&self) -> usize {
        self.queue.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
