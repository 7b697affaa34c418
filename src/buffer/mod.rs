//! Pooled frame buffers
//!
//! - `BufferPool` hands out reusable byte buffers by size class
//! - `DeferredReclaim` returns published frame buffers to the pool after a delay

pub mod pool;
pub mod reclaim;

pub use pool::{BufferPool, PoolConfig};
pub use reclaim::DeferredReclaim;
