//! Upstream sources
//!
//! Which URL or device backs a camera id is decided outside the relay, by a
//! `SourceResolver` injected into the registry.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use futures_util::TryStreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::error::{Error, Result};

use super::id::CameraId;

/// Where a camera's MJPEG byte stream comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// MJPEG over HTTP (`multipart/x-mixed-replace` or a raw JPEG sequence)
    Http {
        /// Stream URL
        url: String,
    },
    /// Local capture device, named pipe or file producing MJPEG bytes
    Device {
        /// Device path
        path: PathBuf,
    },
}

impl SourceDescriptor {
    /// HTTP source
    pub fn http(url: impl Into<String>) -> Self {
        SourceDescriptor::Http { url: url.into() }
    }

    /// Local device source
    pub fn device(path: impl Into<PathBuf>) -> Self {
        SourceDescriptor::Device { path: path.into() }
    }

    /// Interpret a string: `http://` and `https://` are URLs, anything else a path
    pub fn parse(s: &str) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            Self::http(s)
        } else {
            Self::device(s)
        }
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceDescriptor::Http { url } => f.write_str(url),
            SourceDescriptor::Device { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Maps camera ids to upstream sources
pub trait SourceResolver: Send + Sync {
    /// Resolve `id`, or `None` if no such camera exists
    fn resolve(&self, id: &CameraId) -> Option<SourceDescriptor>;
}

impl<F> SourceResolver for F
where
    F: Fn(&CameraId) -> Option<SourceDescriptor> + Send + Sync,
{
    fn resolve(&self, id: &CameraId) -> Option<SourceDescriptor> {
        self(id)
    }
}

/// Fixed id → source table
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    sources: HashMap<CameraId, SourceDescriptor>,
}

impl StaticResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a camera
    pub fn with_camera(mut self, id: impl Into<CameraId>, source: SourceDescriptor) -> Self {
        self.insert(id, source);
        self
    }

    /// Add or replace a camera
    pub fn insert(&mut self, id: impl Into<CameraId>, source: SourceDescriptor) {
        self.sources.insert(id.into(), source);
    }

    /// Number of known cameras
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if no cameras are configured
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SourceResolver for StaticResolver {
    fn resolve(&self, id: &CameraId) -> Option<SourceDescriptor> {
        self.sources.get(id).cloned()
    }
}

/// Byte stream of an opened upstream
pub(crate) type UpstreamReader = Box<dyn AsyncRead + Send + Unpin>;

/// Open the upstream connection for `source`
pub(crate) async fn open_upstream(
    source: &SourceDescriptor,
    client: &reqwest::Client,
) -> Result<UpstreamReader> {
    match source {
        SourceDescriptor::Http { url } => {
            let response = client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::UpstreamStatus(status.as_u16()));
            }

            let body = response
                .bytes_stream()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
            Ok(Box::new(StreamReader::new(Box::pin(body))))
        }
        SourceDescriptor::Device { path } => {
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::new(file))
        }
    }
}
