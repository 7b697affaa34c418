//! Viewer sessions
//!
//! A viewer session samples one camera subscription with drop-to-latest
//! backpressure and writes it to a client sink, either as MJPEG parts or
//! through an encoder as fragmented MP4.

pub mod context;
pub mod latest;
pub mod viewer;

pub use context::{ViewerContext, ViewerMode};
pub use latest::LatestSampler;
pub use viewer::{copy_mp4, stream_mjpeg, stream_mp4, SessionEnd};
