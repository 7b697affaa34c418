//! Viewer context
//!
//! Per-request information carried through a viewer session, mostly for logging.

use std::net::SocketAddr;

use crate::registry::CameraId;

/// Output format requested by a viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerMode {
    /// Raw frames as `multipart/x-mixed-replace`
    Mjpeg,
    /// Fragmented MP4 at the given frame rate
    Mp4 {
        /// Encoder output frame rate
        frame_rate: u32,
    },
}

impl std::fmt::Display for ViewerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewerMode::Mjpeg => f.write_str("mjpeg"),
            ViewerMode::Mp4 { frame_rate } => write!(f, "mp4@{}fps", frame_rate),
        }
    }
}

/// Information about one viewer session
#[derive(Debug, Clone)]
pub struct ViewerContext {
    /// Unique session ID
    pub session_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Requested camera
    pub camera: CameraId,

    /// Requested output format
    pub mode: ViewerMode,
}

impl ViewerContext {
    /// Create a new context
    pub fn new(session_id: u64, peer_addr: SocketAddr, camera: CameraId, mode: ViewerMode) -> Self {
        Self {
            session_id,
            peer_addr,
            camera,
            mode,
        }
    }
}
