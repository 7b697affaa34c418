//! Registry configuration

use std::time::Duration;

use crate::buffer::PoolConfig;
use crate::media::DemuxConfig;

/// Configuration shared by every camera in a registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Per-camera broadcast ring size
    pub broadcast_capacity: usize,

    /// Delay before a published frame buffer goes back to the pool
    pub reclaim_delay: Duration,

    /// How often the reclaim queue is checked
    pub reclaim_interval: Duration,

    /// Timeout for establishing an upstream HTTP connection
    pub connect_timeout: Duration,

    /// Frame demuxing settings
    pub demux: DemuxConfig,

    /// Buffer pool settings
    pub pool: PoolConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            reclaim_delay: Duration::from_secs(2),
            reclaim_interval: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(10),
            demux: DemuxConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Set the broadcast ring size
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Set the buffer reclaim delay
    pub fn reclaim_delay(mut self, delay: Duration) -> Self {
        self.reclaim_delay = delay;
        self
    }

    /// Set the reclaim check interval
    pub fn reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim_interval = interval;
        self
    }

    /// Set the upstream connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set demuxer settings
    pub fn demux(mut self, demux: DemuxConfig) -> Self {
        self.demux = demux;
        self
    }

    /// Set buffer pool settings
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}
