//! # mjpeg-relay
//!
//! Relay live MJPEG camera streams to many HTTP viewers.
//!
//! Each camera is fetched at most once no matter how many viewers watch it.
//! Viewers get the newest frame available when they are ready for one, either
//! as `multipart/x-mixed-replace` MJPEG or transcoded to fragmented MP4 by an
//! external encoder.
//!
//! ```text
//!  camera ──HTTP──► FrameDemuxer ──► Camera (broadcast) ──► LatestSampler ──► MJPEG viewer
//!                        │                   │                    └────────► TranscodeBridge ──► MP4 viewer
//!                   BufferPool ◄── DeferredReclaim
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mjpeg_relay::{CameraRegistry, RelayServer, ServerConfig, SourceDescriptor, StaticResolver};
//!
//! # async fn run() -> mjpeg_relay::Result<()> {
//! let resolver = StaticResolver::new()
//!     .with_camera("lobby", SourceDescriptor::http("http://10.0.0.20/mjpg/video.mjpg"));
//! let registry = Arc::new(CameraRegistry::new(resolver)?);
//!
//! let server = RelayServer::new(ServerConfig::default(), registry);
//! server.run().await
//! # }
//! ```

pub mod buffer;
pub mod error;
pub mod media;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod transcode;

pub use buffer::{BufferPool, DeferredReclaim, PoolConfig};
pub use error::{Error, Result};
pub use media::{DemuxConfig, Delimiters, Frame, FrameDemuxer};
pub use registry::{
    Camera, CameraId, CameraRegistry, FrameEvent, RegistryConfig, SourceDescriptor,
    SourceResolver, StaticResolver, Subscription,
};
pub use server::{RelayServer, ServerConfig};
pub use session::{stream_mjpeg, stream_mp4, LatestSampler, SessionEnd};
pub use transcode::{EncoderConfig, TranscodeBridge};
