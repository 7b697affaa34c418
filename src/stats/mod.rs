//! Runtime statistics

pub mod metrics;

pub use metrics::{CameraStats, FrameRateMeter, PoolStats, ReclaimStats};
