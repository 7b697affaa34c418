//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::media::mjpeg::DEFAULT_BOUNDARY;
use crate::transcode::EncoderConfig;

/// Largest frame rate a viewer may request with `fr`
pub const MAX_FRAME_RATE: u32 = 60;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Multipart boundary used for every MJPEG response
    pub boundary: String,

    /// Encoder settings for MP4 viewers; `frame_rate` is the default when a
    /// request has no `fr` parameter
    pub encoder: EncoderConfig,

    /// Request head must arrive within this time
    pub request_timeout: Duration,

    /// Maximum size of the request head in bytes
    pub max_request_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 0, // Unlimited
            boundary: DEFAULT_BOUNDARY.to_string(),
            encoder: EncoderConfig::default(),
            request_timeout: Duration::from_secs(10),
            max_request_size: 8 * 1024,
            tcp_nodelay: true, // Important for low latency
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the multipart boundary
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }

    /// Set encoder settings
    pub fn encoder(mut self, encoder: EncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Frame rate for a request, falling back to the encoder default
    pub fn frame_rate_for(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.encoder.frame_rate)
            .clamp(1, MAX_FRAME_RATE)
    }
}
