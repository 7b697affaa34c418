//! Deferred return of published frame buffers to the pool
//!
//! Once a frame is broadcast there is no cheap way to know when the last
//! subscriber (or the last in-flight socket write) is done with it. Instead each
//! published buffer waits a fixed delay and is then handed back to the pool.
//!
//! ```text
//!  publish ──► schedule(frame) ──► [ (due, buf) (due, buf) ... ]  ring, oldest first
//!                                        │
//!                          ticker ───────┘ every `interval`: pop all with due <= now
//!                                        │
//!                                        ├─ sole owner ──► pool.give_back(buf)
//!                                        └─ still shared ──► dropped, freed by last reader
//! ```
//!
//! Because the delay is fixed, due times are pushed in increasing order and a
//! `VecDeque` is enough. A buffer that is still referenced when it falls due is
//! never recycled.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::media::Frame;
use crate::stats::ReclaimStats;

use super::pool::BufferPool;

struct Pending {
    due: Instant,
    buffer: Arc<Vec<u8>>,
}

struct ReclaimQueue {
    pool: Arc<BufferPool>,
    delay: Duration,
    pending: Mutex<VecDeque<Pending>>,
    reclaimed: AtomicU64,
    skipped: AtomicU64,
}

impl ReclaimQueue {
    fn drain(&self, now: Option<Instant>) -> usize {
        let due: Vec<Pending> = match self.pending.lock() {
            Ok(mut pending) => {
                let count = match now {
                    Some(now) => pending.iter().take_while(|p| p.due <= now).count(),
                    None => pending.len(),
                };
                pending.drain(..count).collect()
            }
            Err(_) => return 0,
        };

        let mut reclaimed = 0;
        for item in due {
            match Arc::try_unwrap(item.buffer) {
                Ok(buf) => {
                    self.pool.give_back(buf);
                    reclaimed += 1;
                }
                Err(_) => {
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.reclaimed.fetch_add(reclaimed as u64, Ordering::Relaxed);
        reclaimed
    }
}

/// Process-wide delayed reclaimer for published frame buffers
pub struct DeferredReclaim {
    queue: Arc<ReclaimQueue>,
    interval: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl DeferredReclaim {
    /// Create a reclaimer returning buffers to `pool` after `delay`
    ///
    /// The ticker is spawned lazily on the first `schedule` made from inside a
    /// tokio runtime, and checks the queue every `interval`.
    pub fn new(pool: Arc<BufferPool>, delay: Duration, interval: Duration) -> Self {
        Self {
            queue: Arc::new(ReclaimQueue {
                pool,
                delay,
                pending: Mutex::new(VecDeque::new()),
                reclaimed: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
            interval,
            ticker: Mutex::new(None),
        }
    }

    /// Get the reclaim delay
    pub fn delay(&self) -> Duration {
        self.queue.delay
    }

    /// Schedule a published frame's buffer for return to the pool
    pub fn schedule(&self, frame: &Frame) {
        let due = Instant::now() + self.queue.delay;
        if let Ok(mut pending) = self.queue.pending.lock() {
            pending.push_back(Pending {
                due,
                buffer: frame.shared_buffer(),
            });
        }
        self.ensure_ticker();
    }

    /// Reclaim every buffer due at or before `now`, returning how many went back
    /// to the pool
    pub fn reclaim_due(&self, now: Instant) -> usize {
        self.queue.drain(Some(now))
    }

    /// Reclaim everything still queued regardless of due time
    pub fn flush(&self) -> usize {
        self.queue.drain(None)
    }

    /// Get a snapshot of reclaim statistics
    pub fn stats(&self) -> ReclaimStats {
        ReclaimStats {
            pending: self.queue.pending.lock().map(|p| p.len()).unwrap_or(0),
            reclaimed: self.queue.reclaimed.load(Ordering::Relaxed),
            skipped: self.queue.skipped.load(Ordering::Relaxed),
        }
    }

    fn ensure_ticker(&self) {
        let Ok(mut ticker) = self.ticker.lock() else {
            return;
        };
        if ticker.is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let queue = Arc::clone(&self.queue);
        let interval = self.interval;
        *ticker = Some(runtime.spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                let count = queue.drain(Some(Instant::now()));
                if count > 0 {
                    tracing::trace!(reclaimed = count, "Returned frame buffers to pool");
                }
            }
        }));

        tracing::debug!(
            delay_ms = self.queue.delay.as_millis() as u64,
            "Frame buffer reclaim ticker started"
        );
    }
}

impl Drop for DeferredReclaim {
    fn drop(&mut self) {
        if let Ok(mut ticker) = self.ticker.lock() {
            if let Some(handle) = ticker.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_from_pool(pool: &BufferPool, sequence: u64) -> Frame {
        let mut buf = pool.take(1000);
        buf.extend_from_slice(&[sequence as u8; 1000]);
        Frame::new(buf, sequence)
    }

    #[test]
    fn test_reclaim_due_only_returns_expired() {
        let pool = Arc::new(BufferPool::new());
        let reclaim = DeferredReclaim::new(
            Arc::clone(&pool),
            Duration::from_secs(2),
            Duration::from_millis(250),
        );

        let start = Instant::now();
        for seq in 0..3 {
            reclaim.schedule(&frame_from_pool(&pool, seq));
        }
        assert_eq!(reclaim.stats().pending, 3);

        assert_eq!(reclaim.reclaim_due(start), 0);
        assert_eq!(reclaim.reclaim_due(start + Duration::from_secs(3)), 3);

        let stats = reclaim.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.reclaimed, 3);
        assert_eq!(pool.stats().returned, 3);
    }

    #[test]
    fn test_still_referenced_buffer_is_not_recycled() {
        let pool = Arc::new(BufferPool::new());
        let reclaim = DeferredReclaim::new(
            Arc::clone(&pool),
            Duration::from_millis(10),
            Duration::from_millis(10),
        );

        let held = frame_from_pool(&pool, 1);
        reclaim.schedule(&held);
        reclaim.schedule(&frame_from_pool(&pool, 2));

        assert_eq!(reclaim.flush(), 1);
        let stats = reclaim.stats();
        assert_eq!(stats.skipped, 1);
        assert_eq!(pool.stats().returned, 1);

        // The held frame is still intact
        assert!(held.as_bytes().iter().all(|&b| b == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_returns_buffers_after_delay() {
        let pool = Arc::new(BufferPool::new());
        let reclaim = DeferredReclaim::new(
            Arc::clone(&pool),
            Duration::from_secs(2),
            Duration::from_millis(250),
        );

        for seq in 0..5 {
            reclaim.schedule(&frame_from_pool(&pool, seq));
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(reclaim.stats().reclaimed, 0);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(reclaim.stats().reclaimed, 5);
        assert_eq!(pool.stats().free_buffers, 5);

        // The next take reuses a reclaimed buffer
        let allocations = pool.stats().allocations;
        let _buf = pool.take(1000);
        assert_eq!(pool.stats().allocations, allocations);
    }
}
