//! Media handling for the relay
//!
//! This module provides:
//! - Delimiter search over raw stream bytes
//! - Frame demuxing from a continuous MJPEG byte stream
//! - The shared `Frame` type
//! - MJPEG multipart part framing for viewers

pub mod demux;
pub mod frame;
pub mod mjpeg;
pub mod search;

pub use demux::{DemuxConfig, Delimiters, FrameDemuxer, JPEG_FOOTER, JPEG_HEADER};
pub use frame::Frame;
pub use search::find;
