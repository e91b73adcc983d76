//! A single bounded, closeable, non-blocking queue.

use crate::error::{Result, SpiderError};
use crossbeam::queue::ArrayQueue;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Fixed-capacity FIFO queue used as the building block of a [`Pool`](super::Pool).
///
/// `put` and `get` never wait: a full or empty queue is reported as "try
/// again" rather than as an error. Both hold the shared side of `closing_lock`
/// for their whole duration, so `close`, which takes the exclusive side, only
/// proceeds once every in-flight operation has finished.
pub struct Buffer<T> {
    queue: ArrayQueue<T>,
    closed: AtomicBool,
    closing_lock: RwLock<()>,
}

impl<T> Buffer<T> {
    pub fn new(capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(SpiderError::illegal_parameter("buffer capacity must be at least 1"));
        }
        Ok(Self {
            queue: ArrayQueue::new(capacity as usize),
            closed: AtomicBool::new(false),
            closing_lock: RwLock::new(()),
        })
    }

    pub fn cap(&self) -> u32 {
        self.queue.capacity() as u32
    }

    pub fn len(&self) -> u32 {
        self.queue.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Enqueues `item`. Returns `Ok(None)` once stored and `Ok(Some(item))`,
    /// handing the item back, when the queue is full.
    pub fn put(&self, item: T) -> Result<Option<T>> {
        let _guard = self.closing_lock.read();
        if self.closed() {
            return Err(SpiderError::BufferClosed);
        }
        match self.queue.push(item) {
            Ok(()) => Ok(None),
            Err(item) => Ok(Some(item)),
        }
    }

    /// Dequeues the oldest item, or `Ok(None)` when the queue is empty.
    pub fn get(&self) -> Result<Option<T>> {
        let _guard = self.closing_lock.read();
        if self.closed() {
            return Err(SpiderError::BufferClosed);
        }
        Ok(self.queue.pop())
    }

    /// Closes the buffer and drops whatever it still holds.
    ///
    /// Exactly one caller gets `true`; every later or concurrent call returns
    /// `false`.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let _guard = self.closing_lock.write();
        while self.queue.pop().is_some() {}
        true
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<T> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("cap", &self.cap())
            .field("len", &self.len())
            .field("closed", &self.closed())
            .finish()
    }
}
