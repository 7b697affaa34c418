//! Camera registry for frame fan-out
//!
//! The registry maps camera ids to `Camera` instances. Each camera owns at most
//! one upstream fetch, shared by all of its subscribers.
//!
//! # Architecture
//!
//! ```text
//!                     ┌──────────────────────────────┐
//!                     │       CameraRegistry         │
//!                     │  RwLock<HashMap<CameraId,    │
//!                     │    Arc<Camera> {             │
//!                     │      subscribers,            │
//!                     │      live fetch task,        │
//!                     │      tx: broadcast::Tx,      │
//!                     │    }                         │
//!                     │  >>                          │
//!                     └──────────────┬───────────────┘
//!                                    │
//!         ┌──────────────────────────┼──────────────────────────┐
//!         │                          │                          │
//!         ▼                          ▼                          ▼
//!   [Fetch task]               [Subscriber]               [Subscriber]
//!   open_upstream()            LatestSampler              LatestSampler
//!   FrameDemuxer ──► tx.send() ──► rx ──► MJPEG sink      rx ──► encoder
//! ```
//!
//! The fetch starts with the first subscriber and is cancelled when the last
//! one drops its `Subscription`. A fetch that fails or ends delivers a terminal
//! `FrameEvent` to everyone subscribed; the next subscriber starts over.
//!
//! # Shared Buffers
//!
//! A `Frame` wraps its pooled buffer in an `Arc`, so every subscriber reads the
//! same allocation. Buffers go back to the pool through `DeferredReclaim`.

pub mod camera;
pub mod config;
pub mod id;
pub mod source;
pub mod store;

pub use camera::{Camera, FrameEvent, Subscription};
pub use config::RegistryConfig;
pub use id::CameraId;
pub use source::{SourceDescriptor, SourceResolver, StaticResolver};
pub use store::CameraRegistry;
