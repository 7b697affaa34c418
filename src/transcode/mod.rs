//! MJPEG to fragmented MP4 transcoding through an external encoder

pub mod bridge;
pub mod config;

pub use bridge::{FeedEnd, TranscodeBridge};
pub use config::{EncoderConfig, DEFAULT_FRAME_RATE};
