//! # Pool Module
//!
//! An elastic set of [`Buffer`]s behaving like one bounded queue.
//!
//! ## Overview
//!
//! A single fixed-size queue either stalls producers under bursty load or
//! wastes memory while idle. A `Pool` starts with one buffer, adds buffers
//! while producers keep finding every buffer full, and retires buffers while
//! consumers keep finding them empty. Total capacity stays bounded by
//! `max_buffer_num × buffer_cap`.
//!
//! ## Mechanics
//!
//! Live buffers circulate through an internal channel. An operation takes one
//! buffer out, tries it, and hands it straight back, so each buffer is only
//! ever touched by one operation at a time and none is held across an await
//! point. Failed attempts are counted per call:
//!
//! - `put` grows the pool after `3 × buffer_num` full results, as long as the
//!   pool is below its maximum.
//! - `get` retires the buffer it holds after `8 × buffer_num` empty results, as
//!   long as more than one buffer is live.
//!
//! After every sweep over the live buffers a caller parks on a notification
//! (bounded by a short timeout) instead of spinning.
//!
//! Items are not ordered across buffers; within a buffer they are FIFO.

mod buffer;

pub use buffer::Buffer;

use crate::error::{Result, SpiderError};
use kanal::{AsyncReceiver, AsyncSender};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Full results per live buffer before a `put` grows the pool.
const PUT_FAILURE_FACTOR: u32 = 3;
/// Empty results per live buffer before a `get` retires a buffer.
const GET_FAILURE_FACTOR: u32 = 8;
/// Extra room in the buffer channel beyond the maximum buffer count.
const CHANNEL_SLACK: u32 = 2;
/// Upper bound on a single park between sweeps.
const RETRY_PARK: Duration = Duration::from_millis(10);

/// Point-in-time counters of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub buffer_cap: u32,
    pub max_buffer_num: u32,
    pub buffer_num: u32,
    pub total: u64,
    pub closed: bool,
}

pub struct Pool<T> {
    buffer_cap: u32,
    max_buffer_num: u32,
    buffer_num: AtomicU32,
    total: AtomicU64,
    buf_tx: AsyncSender<Buffer<T>>,
    buf_rx: AsyncReceiver<Buffer<T>>,
    closed: AtomicBool,
    lock: RwLock<()>,
    item_ready: Notify,
    space_ready: Notify,
}

impl<T: Send + 'static> Pool<T> {
    /// Creates a pool seeded with one buffer of `buffer_cap` slots that may
    /// grow to `max_buffer_num` buffers.
    pub fn new(buffer_cap: u32, max_buffer_num: u32) -> Result<Self> {
        if buffer_cap == 0 {
            return Err(SpiderError::illegal_parameter("pool buffer capacity must be at least 1"));
        }
        if max_buffer_num == 0 {
            return Err(SpiderError::illegal_parameter("pool max buffer number must be at least 1"));
        }
        let (buf_tx, buf_rx) = kanal::bounded_async((max_buffer_num + CHANNEL_SLACK) as usize);
        let seed = Buffer::new(buffer_cap)?;
        if !matches!(buf_tx.try_send(seed), Ok(true)) {
            return Err(SpiderError::illegal_parameter("failed to seed pool with its first buffer"));
        }
        Ok(Self {
            buffer_cap,
            max_buffer_num,
            buffer_num: AtomicU32::new(1),
            total: AtomicU64::new(0),
            buf_tx,
            buf_rx,
            closed: AtomicBool::new(false),
            lock: RwLock::new(()),
            item_ready: Notify::new(),
            space_ready: Notify::new(),
        })
    }

    pub fn buffer_cap(&self) -> u32 {
        self.buffer_cap
    }

    pub fn max_buffer_num(&self) -> u32 {
        self.max_buffer_num
    }

    pub fn buffer_num(&self) -> u32 {
        self.buffer_num.load(Ordering::SeqCst)
    }

    /// Items currently held across all buffers.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            buffer_cap: self.buffer_cap,
            max_buffer_num: self.max_buffer_num,
            buffer_num: self.buffer_num(),
            total: self.total(),
            closed: self.closed(),
        }
    }

    /// Stores `item`, growing the pool under sustained back-pressure.
    ///
    /// Waits while the pool is at capacity; fails only once the pool is closed.
    pub async fn put(&self, item: T) -> Result<()> {
        let mut item = item;
        let mut failures: u32 = 0;
        loop {
            let buffer = self.take_buffer().await?;
            // Reserve the slot first so a concurrent `get` never drives the
            // counter below zero.
            self.total.fetch_add(1, Ordering::SeqCst);
            match buffer.put(item) {
                Ok(None) => {
                    self.give_back(buffer);
                    self.item_ready.notify_one();
                    return Ok(());
                }
                Ok(Some(rejected)) => {
                    self.release_slot();
                    item = rejected;
                    failures += 1;
                }
                Err(e) => {
                    self.release_slot();
                    self.give_back(buffer);
                    return Err(e);
                }
            }

            let buffer_num = self.buffer_num();
            if failures >= PUT_FAILURE_FACTOR * buffer_num && buffer_num < self.max_buffer_num {
                match self.grow(item) {
                    Ok(None) => {
                        self.give_back(buffer);
                        self.item_ready.notify_one();
                        return Ok(());
                    }
                    Ok(Some(rejected)) => {
                        item = rejected;
                        failures = 0;
                    }
                    Err(e) => {
                        self.give_back(buffer);
                        return Err(e);
                    }
                }
            }
            self.give_back(buffer);

            if failures % buffer_num.max(1) == 0 {
                park(&self.space_ready).await;
            }
        }
    }

    /// Removes one item, retiring cold buffers under sustained idleness.
    ///
    /// Waits while the pool is empty; fails only once the pool is closed.
    pub async fn get(&self) -> Result<T> {
        let mut failures: u32 = 0;
        loop {
            let buffer = self.take_buffer().await?;
            match buffer.get() {
                Ok(Some(item)) => {
                    self.release_slot();
                    self.give_back(buffer);
                    self.space_ready.notify_one();
                    return Ok(item);
                }
                Ok(None) => failures += 1,
                Err(e) => {
                    self.give_back(buffer);
                    return Err(e);
                }
            }

            let buffer_num = self.buffer_num();
            if failures >= GET_FAILURE_FACTOR * buffer_num && buffer_num > 1 {
                if let Some(buffer) = self.retire(buffer) {
                    self.give_back(buffer);
                }
                failures = 0;
            } else {
                self.give_back(buffer);
            }

            if failures % buffer_num.max(1) == 0 {
                park(&self.item_ready).await;
            }
        }
    }

    /// Closes the pool and every buffer in it. Only the first call returns
    /// `true`.
    pub fn close(&self) -> bool {
        let _guard = self.lock.write();
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        while let Ok(Some(buffer)) = self.buf_rx.try_recv() {
            buffer.close();
            self.buffer_num.fetch_sub(1, Ordering::SeqCst);
        }
        let _ = self.buf_rx.close();
        self.total.store(0, Ordering::SeqCst);
        self.item_ready.notify_waiters();
        self.space_ready.notify_waiters();
        debug!("Pool closed with {} buffers still in flight", self.buffer_num());
        true
    }

    fn release_slot(&self) {
        // `close` zeroes the counter while operations may still be in flight.
        let _ = self
            .total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }

    async fn take_buffer(&self) -> Result<Buffer<T>> {
        if self.closed() {
            return Err(SpiderError::BufferClosed);
        }
        self.buf_rx.recv().await.map_err(|_| SpiderError::BufferClosed)
    }

    /// Returns a buffer to the live set, or destroys it if the pool closed
    /// while it was checked out.
    fn give_back(&self, buffer: Buffer<T>) {
        let _guard = self.lock.read();
        if self.closed() {
            buffer.close();
            self.buffer_num.fetch_sub(1, Ordering::SeqCst);
            // A put that raced the close may have counted an item this buffer
            // no longer holds.
            self.total.store(0, Ordering::SeqCst);
            return;
        }
        if !matches!(self.buf_tx.try_send(buffer), Ok(true)) {
            self.buffer_num.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Adds a buffer seeded with `item`. Hands the item back if the pool
    /// reached its maximum in the meantime.
    fn grow(&self, item: T) -> Result<Option<T>> {
        let _guard = self.lock.write();
        if self.closed() {
            return Err(SpiderError::BufferClosed);
        }
        if self.buffer_num() >= self.max_buffer_num {
            return Ok(Some(item));
        }
        let buffer = Buffer::new(self.buffer_cap)?;
        if let Some(item) = buffer.put(item)? {
            return Ok(Some(item));
        }
        self.total.fetch_add(1, Ordering::SeqCst);
        if !matches!(self.buf_tx.try_send(buffer), Ok(true)) {
            self.release_slot();
            return Err(SpiderError::BufferClosed);
        }
        let buffer_num = self.buffer_num.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("Pool grew to {} buffers", buffer_num);
        Ok(None)
    }

    /// Destroys an empty buffer unless it is the last one live. Returns the
    /// buffer when it has to stay.
    fn retire(&self, buffer: Buffer<T>) -> Option<Buffer<T>> {
        let _guard = self.lock.write();
        if self.closed() || self.buffer_num() <= 1 || !buffer.is_empty() {
            return Some(buffer);
        }
        buffer.close();
        let buffer_num = self.buffer_num.fetch_sub(1, Ordering::SeqCst) - 1;
        trace!("Pool shrank to {} buffers", buffer_num);
        None
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("buffer_cap", &self.buffer_cap)
            .field("max_buffer_num", &self.max_buffer_num)
            .field("buffer_num", &self.buffer_num.load(Ordering::SeqCst))
            .field("total", &self.total.load(Ordering::SeqCst))
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

async fn park(notify: &Notify) {
    let _ = tokio::time::timeout(RETRY_PARK, notify.notified()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn rejects_zero_sizes() {
        assert!(Pool::<u8>::new(0, 1).is_err());
        assert!(Pool::<u8>::new(1, 0).is_err());
    }

    #[tokio::test]
    async fn put_then_get_tracks_total() {
        let pool = Pool::new(4, 2).unwrap();
        pool.put(1).await.unwrap();
        pool.put(2).await.unwrap();
        assert_eq!(pool.total(), 2);
        assert_eq!(pool.buffer_num(), 1);

        let mut got = vec![pool.get().await.unwrap(), pool.get().await.unwrap()];
        got.sort();
        assert_eq!(got, vec![1, 2]);
        assert_eq!(pool.total(), 0);
    }

    #[tokio::test]
    async fn grows_under_pressure_up_to_max() {
        let pool = Arc::new(Pool::new(1, 3).unwrap());
        for n in 0..3 {
            pool.put(n).await.unwrap();
        }
        assert_eq!(pool.buffer_num(), 3);
        assert_eq!(pool.total(), 3);

        // A full pool at its maximum makes producers wait rather than grow.
        let blocked = tokio::time::timeout(Duration::from_millis(200), pool.put(99)).await;
        assert!(blocked.is_err());
        assert_eq!(pool.buffer_num(), 3);
        assert_eq!(pool.total(), 3);
    }

    #[tokio::test]
    async fn shrinks_when_idle_but_keeps_one_buffer() {
        let pool = Arc::new(Pool::new(1, 3).unwrap());
        for n in 0..3 {
            pool.put(n).await.unwrap();
        }
        for _ in 0..3 {
            pool.get().await.unwrap();
        }
        assert_eq!(pool.buffer_num(), 3);

        let getter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get().await })
        };
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(pool.buffer_num(), 1);

        pool.put(7).await.unwrap();
        assert_eq!(getter.await.unwrap().unwrap(), 7);
        assert_eq!(pool.buffer_num(), 1);
        assert_eq!(pool.total(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_and_gets_conserve_items() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let pool = Arc::new(Pool::new(8, 4).unwrap());
        let mut producers = Vec::new();
        for p in 0..PRODUCERS {
            let pool = Arc::clone(&pool);
            producers.push(tokio::spawn(async move {
                for n in 0..PER_PRODUCER {
                    pool.put(p * PER_PRODUCER + n).await.unwrap();
                    assert!(pool.buffer_num() <= pool.max_buffer_num());
                }
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..2 {
            let pool = Arc::clone(&pool);
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..(PRODUCERS * PER_PRODUCER / 2) {
                    seen.push(pool.get().await.unwrap());
                }
                seen
            }));
        }

        for producer in producers {
            producer.await.unwrap();
        }
        let mut all = HashSet::new();
        for consumer in consumers {
            for n in consumer.await.unwrap() {
                assert!(all.insert(n), "item {n} delivered twice");
            }
        }
        assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
        assert_eq!(pool.total(), 0);
        assert!(pool.buffer_num() >= 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_fails_operations() {
        let pool = Arc::new(Pool::new(2, 2).unwrap());
        pool.put("queued").await.unwrap();

        assert!(pool.close());
        assert!(!pool.close());
        assert!(pool.closed());
        assert!(matches!(pool.put("late").await, Err(SpiderError::BufferClosed)));
        assert!(matches!(pool.get().await, Err(SpiderError::BufferClosed)));
        assert_eq!(pool.total(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn close_under_load_destroys_every_buffer() {
        let pool = Arc::new(Pool::new(1, 4).unwrap());
        let late_puts = Arc::new(AtomicUsize::new(0));

        let mut producers = Vec::new();
        for p in 0..8usize {
            let pool = Arc::clone(&pool);
            let late_puts = Arc::clone(&late_puts);
            producers.push(tokio::spawn(async move {
                for n in 0usize.. {
                    let closed_before = pool.closed();
                    match pool.put(p * 1_000_000 + n).await {
                        Ok(()) if closed_before => {
                            late_puts.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(()) => {}
                        Err(_) => break,
                    }
                }
            }));
        }
        let consumer = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { while pool.get().await.is_ok() {} })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pool.close());

        tokio::time::timeout(Duration::from_secs(5), async {
            for producer in producers {
                producer.await.unwrap();
            }
            consumer.await.unwrap();
        })
        .await
        .expect("producers should observe the close");

        assert_eq!(late_puts.load(Ordering::SeqCst), 0);
        assert_eq!(pool.buffer_num(), 0);
        assert_eq!(pool.total(), 0);
    }

    #[tokio::test]
    async fn close_wakes_waiting_consumers() {
        let pool = Arc::new(Pool::<u32>::new(2, 2).unwrap());
        let getter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.close();

        let result = tokio::time::timeout(Duration::from_secs(1), getter)
            .await
            .expect("getter should observe the close")
            .unwrap();
        assert!(matches!(result, Err(SpiderError::BufferClosed)));
    }
}
