//! Camera registry implementation
//!
//! The registry lazily creates one `Camera` per id and keeps it for the life of
//! the registry. Cameras are cheap while idle: no upstream connection is held
//! without subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::buffer::{BufferPool, DeferredReclaim};
use crate::error::{Error, Result};
use crate::stats::{CameraStats, PoolStats, ReclaimStats};

use super::camera::{Camera, RegistryShared, Subscription};
use super::config::RegistryConfig;
use super::id::CameraId;
use super::source::SourceResolver;

/// Registry of cameras keyed by id
///
/// Thread-safe via `RwLock`. Lookups of existing cameras only take the read
/// lock; the write lock is taken once per id, on creation.
pub struct CameraRegistry {
    /// Map of camera id to camera
    cameras: RwLock<HashMap<CameraId, Arc<Camera>>>,

    /// Maps ids to upstream sources
    resolver: Arc<dyn SourceResolver>,

    /// Pool, reclaimer and HTTP client shared by all cameras
    shared: Arc<RegistryShared>,
}

impl CameraRegistry {
    /// Create a registry with default configuration
    pub fn new(resolver: impl SourceResolver + 'static) -> Result<Self> {
        Self::with_config(RegistryConfig::default(), resolver)
    }

    /// Create a registry with custom configuration
    pub fn with_config(
        config: RegistryConfig,
        resolver: impl SourceResolver + 'static,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        let pool = Arc::new(BufferPool::with_config(config.pool.clone()));
        let reclaim = DeferredReclaim::new(
            Arc::clone(&pool),
            config.reclaim_delay,
            config.reclaim_interval,
        );

        Ok(Self {
            cameras: RwLock::new(HashMap::new()),
            resolver: Arc::new(resolver),
            shared: Arc::new(RegistryShared {
                config,
                pool,
                reclaim,
                http,
            }),
        })
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    /// Get the buffer pool shared by all cameras
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.shared.pool
    }

    /// Get the camera for `id`, creating it on first request
    ///
    /// Concurrent first requests for the same id get the same camera. Fails
    /// with `UnknownCamera` when the resolver has no source for `id`.
    pub async fn get_or_create(&self, id: &CameraId) -> Result<Arc<Camera>> {
        if let Some(camera) = self.cameras.read().await.get(id) {
            return Ok(Arc::clone(camera));
        }

        let source = self
            .resolver
            .resolve(id)
            .ok_or_else(|| Error::UnknownCamera(id.clone()))?;

        let mut cameras = self.cameras.write().await;
        let camera = cameras.entry(id.clone()).or_insert_with(|| {
            tracing::info!(camera = %id, source = %source, "Camera registered");
            Arc::new(Camera::new(id.clone(), source, Arc::clone(&self.shared)))
        });

        Ok(Arc::clone(camera))
    }

    /// Get an existing camera without creating it
    pub async fn get(&self, id: &CameraId) -> Option<Arc<Camera>> {
        self.cameras.read().await.get(id).cloned()
    }

    /// Subscribe to the camera for `id`, creating it if needed
    pub async fn subscribe(&self, id: &CameraId) -> Result<Subscription> {
        let camera = self.get_or_create(id).await?;
        Ok(camera.subscribe())
    }

    /// Get total number of cameras created so far
    pub async fn camera_count(&self) -> usize {
        self.cameras.read().await.len()
    }

    /// Get camera statistics
    pub async fn camera_stats(&self, id: &CameraId) -> Option<CameraStats> {
        self.cameras.read().await.get(id).map(|camera| camera.stats())
    }

    /// Get buffer pool statistics
    pub fn pool_stats(&self) -> PoolStats {
        self.shared.pool.stats()
    }

    /// Get deferred reclaim statistics
    pub fn reclaim_stats(&self) -> ReclaimStats {
        self.shared.reclaim.stats()
    }
}

impl std::fmt::Debug for CameraRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraRegistry")
            .field("config", &self.shared.config)
            .finish()
    }
}
