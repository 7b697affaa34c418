//! Size-bucketed byte buffer pool
//!
//! Frames arrive at a steady rate and are all roughly the same size, so the
//! demuxer and the frame publisher keep asking for buffers of similar capacity.
//! The pool keeps returned buffers in power-of-two size classes and hands them
//! out again instead of going back to the allocator.
//!
//! ```text
//!   take(5000) ──► class 8K ──► 16K ──► ... ──► 128K   (first non-empty bucket wins)
//!                    │ all empty
//!                    ▼
//!               allocate 8K (counted in stats.allocations)
//!
//!   give_back(buf) ──► bucket = largest class <= buf.capacity()
//! ```
//!
//! Buffers are never zeroed. A buffer comes back from `take` with length 0 and
//! callers only ever read what they wrote into it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::stats::PoolStats;

/// Buffer pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on bytes kept in the free lists
    pub total_budget_bytes: usize,

    /// Largest pooled buffer; bigger requests are allocated directly
    pub max_buffer_size: usize,

    /// Smallest size class
    pub min_buffer_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            total_budget_bytes: 100 * 1024 * 1024, // 100MB
            max_buffer_size: 128 * 1024,           // 128KB
            min_buffer_size: 4 * 1024,
        }
    }
}

impl PoolConfig {
    /// Set the total byte budget
    pub fn total_budget(mut self, bytes: usize) -> Self {
        self.total_budget_bytes = bytes;
        self
    }

    /// Set the largest pooled buffer size
    pub fn max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size = bytes;
        self
    }

    /// Set the smallest size class
    pub fn min_buffer_size(mut self, bytes: usize) -> Self {
        self.min_buffer_size = bytes.max(1);
        self
    }
}

struct FreeLists {
    buckets: Vec<Vec<Vec<u8>>>,
    free_bytes: usize,
}

/// Thread-safe pool of reusable byte buffers
pub struct BufferPool {
    config: PoolConfig,
    classes: Vec<usize>,
    free: Mutex<FreeLists>,
    allocations: AtomicU64,
    reuses: AtomicU64,
    oversized: AtomicU64,
    returned: AtomicU64,
    discarded: AtomicU64,
}

impl BufferPool {
    /// Create a pool with default configuration
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool with custom configuration
    pub fn with_config(config: PoolConfig) -> Self {
        let classes = size_classes(config.min_buffer_size, config.max_buffer_size);
        let buckets = classes.iter().map(|_| Vec::new()).collect();

        Self {
            config,
            classes,
            free: Mutex::new(FreeLists {
                buckets,
                free_bytes: 0,
            }),
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            oversized: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Take an empty buffer whose capacity is at least `min_size`
    pub fn take(&self, min_size: usize) -> Vec<u8> {
        let Some(class) = self.classes.iter().position(|&size| size >= min_size) else {
            // Larger than any class: serve it anyway rather than fail the frame
            self.oversized.fetch_add(1, Ordering::Relaxed);
            return Vec::with_capacity(min_size);
        };

        if let Ok(mut free) = self.free.lock() {
            let FreeLists {
                buckets,
                free_bytes,
            } = &mut *free;
            for bucket in &mut buckets[class..] {
                if let Some(buf) = bucket.pop() {
                    *free_bytes -= buf.capacity();
                    self.reuses.fetch_add(1, Ordering::Relaxed);
                    return buf;
                }
            }
        }

        self.allocations.fetch_add(1, Ordering::Relaxed);
        Vec::with_capacity(self.classes[class])
    }

    /// Return a buffer for reuse
    ///
    /// Buffers outside the pooled size range, or that would push the free lists
    /// past the budget, are dropped.
    pub fn give_back(&self, mut buf: Vec<u8>) {
        let capacity = buf.capacity();
        let Some(class) = self.classes.iter().rposition(|&size| size <= capacity) else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if capacity > self.config.max_buffer_size {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if let Ok(mut free) = self.free.lock() {
            if free.free_bytes + capacity > self.config.total_budget_bytes {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                return;
            }
            buf.clear();
            free.free_bytes += capacity;
            free.buckets[class].push(buf);
            self.returned.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get a snapshot of pool statistics
    pub fn stats(&self) -> PoolStats {
        let (free_buffers, free_bytes) = self
            .free
            .lock()
            .map(|free| {
                (
                    free.buckets.iter().map(Vec::len).sum(),
                    free.free_bytes,
                )
            })
            .unwrap_or((0, 0));

        PoolStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            oversized: self.oversized.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            free_buffers,
            free_bytes,
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Power-of-two classes from `min` up to and including `max`
fn size_classes(min: usize, max: usize) -> Vec<usize> {
    let mut classes = Vec::new();
    let mut size = min.max(1);
    while size < max {
        classes.push(size);
        size = size.saturating_mul(2);
    }
    classes.push(max.max(min));
    classes
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn small_pool() -> BufferPool {
        BufferPool::with_config(
            PoolConfig::default()
                .min_buffer_size(1024)
                .max_buffer_size(16 * 1024)
                .total_budget(64 * 1024),
        )
    }

    #[test]
    fn test_size_classes() {
        assert_eq!(size_classes(4096, 16384), vec![4096, 8192, 16384]);
        // Max that is not a power-of-two multiple still gets its own class
        assert_eq!(size_classes(1000, 3000), vec![1000, 2000, 3000]);
        assert_eq!(size_classes(4096, 4096), vec![4096]);
    }

    #[test]
    fn test_take_rounds_up_to_class() {
        let pool = small_pool();

        let buf = pool.take(1500);
        assert!(buf.capacity() >= 2048);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_round_trip_reuses_without_allocating() {
        let pool = small_pool();

        let mut buf = pool.take(3000);
        buf.extend_from_slice(&[7u8; 3000]);
        pool.give_back(buf);
        assert_eq!(pool.stats().allocations, 1);

        // Equal size comes from the free list
        let buf = pool.take(3000);
        assert_eq!(pool.stats().allocations, 1);
        assert_eq!(pool.stats().reuses, 1);
        assert!(buf.is_empty());
        pool.give_back(buf);

        // Smaller size also reuses the larger free buffer
        let buf = pool.take(100);
        assert_eq!(pool.stats().allocations, 1);
        assert_eq!(pool.stats().reuses, 2);
        assert!(buf.capacity() >= 3000);
    }

    #[test]
    fn test_larger_request_allocates() {
        let pool = small_pool();

        pool.give_back(pool.take(1024));
        let buf = pool.take(8 * 1024);

        assert!(buf.capacity() >= 8 * 1024);
        assert_eq!(pool.stats().allocations, 2);
    }

    #[test]
    fn test_oversized_served_but_not_pooled() {
        let pool = small_pool();

        let buf = pool.take(100 * 1024);
        assert!(buf.capacity() >= 100 * 1024);
        assert_eq!(pool.stats().oversized, 1);

        pool.give_back(buf);
        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.free_buffers, 0);
    }

    #[test]
    fn test_free_bytes_capped_by_budget() {
        let pool = small_pool();

        // 5 x 16K = 80K exceeds the 64K budget
        let bufs: Vec<_> = (0..5).map(|_| pool.take(16 * 1024)).collect();
        for buf in bufs {
            pool.give_back(buf);
        }

        let stats = pool.stats();
        assert_eq!(stats.free_buffers, 4);
        assert_eq!(stats.free_bytes, 64 * 1024);
        assert_eq!(stats.discarded, 1);
    }

    #[test]
    fn test_undersized_buffer_discarded() {
        let pool = small_pool();

        pool.give_back(Vec::with_capacity(10));
        assert_eq!(pool.stats().discarded, 1);
        assert_eq!(pool.stats().free_buffers, 0);
    }

    #[test]
    fn test_concurrent_take_and_return() {
        let pool = Arc::new(small_pool());

        std::thread::scope(|scope| {
            for t in 0..4 {
                let pool = Arc::clone(&pool);
                scope.spawn(move || {
                    for i in 0..200 {
                        let mut buf = pool.take(1024 + (t * 100 + i) % 4000);
                        buf.push(t as u8);
                        pool.give_back(buf);
                    }
                });
            }
        });

        let stats = pool.stats();
        assert_eq!(stats.allocations + stats.reuses, 800);
        // Each thread holds one buffer at a time, so no class grows past 4 buffers
        assert!(stats.allocations <= 4 * 4);
    }
}
