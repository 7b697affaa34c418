//! Statistics for cameras, the buffer pool and buffer reclamation

use std::time::Duration;

use tokio::time::Instant;

/// Camera-level statistics
#[derive(Debug, Clone, Default)]
pub struct CameraStats {
    /// Upstream fetches started since the camera was created
    pub fetches_started: u64,
    /// Whether an upstream fetch is currently running
    pub live: bool,
    /// Current number of subscribers
    pub subscribers: usize,
    /// Frames published across all fetches
    pub frames_published: u64,
    /// Bytes of frame data published
    pub bytes_published: u64,
    /// Frames received during the last complete one-second window
    pub last_fps: u32,
}

/// Buffer pool statistics
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Buffers freshly allocated for a size class
    pub allocations: u64,
    /// Takes served from a free list
    pub reuses: u64,
    /// Takes larger than the biggest class, allocated directly
    pub oversized: u64,
    /// Buffers accepted back into a free list
    pub returned: u64,
    /// Buffers dropped on return (out of range or over budget)
    pub discarded: u64,
    /// Buffers currently in the free lists
    pub free_buffers: usize,
    /// Bytes currently in the free lists
    pub free_bytes: usize,
}

/// Deferred reclaim statistics
#[derive(Debug, Clone, Default)]
pub struct ReclaimStats {
    /// Buffers waiting for their delay to elapse
    pub pending: usize,
    /// Buffers handed back to the pool
    pub reclaimed: u64,
    /// Buffers still referenced when due, left to the allocator
    pub skipped: u64,
}

/// Counts frames per fixed window
#[derive(Debug)]
pub struct FrameRateMeter {
    window: Duration,
    window_start: Instant,
    count: u32,
}

impl FrameRateMeter {
    /// Create a meter with a one-second window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    /// Create a meter with a custom window
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Record one frame at `now`
    ///
    /// Returns the count of the previous window when `now` starts a new one.
    pub fn record(&mut self, now: Instant) -> Option<u32> {
        let mut completed = None;
        if now.duration_since(self.window_start) >= self.window {
            completed = Some(self.count);
            self.window_start = now;
            self.count = 0;
        }
        self.count += 1;
        completed
    }
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_stats_default() {
        let stats = CameraStats::default();
        assert_eq!(stats.fetches_started, 0);
        assert!(!stats.live);
        assert_eq!(stats.subscribers, 0);
        assert_eq!(stats.frames_published, 0);
    }

    #[test]
    fn test_frame_rate_meter_windows() {
        let start = Instant::now();
        let mut meter = FrameRateMeter::with_window(Duration::from_secs(1));

        for i in 0..10 {
            let at = start + Duration::from_millis(i * 90);
            assert_eq!(meter.record(at), None);
        }

        // First frame of the next window reports the previous one
        let next = start + Duration::from_millis(1100);
        assert_eq!(meter.record(next), Some(10));

        assert_eq!(meter.record(next + Duration::from_millis(10)), None);
        assert_eq!(meter.record(next + Duration::from_secs(2)), Some(2));
    }
}
