//! Per-camera frame source
//!
//! A `Camera` owns at most one upstream fetch at a time. The fetch is started by
//! the first subscriber and cancelled when the last one leaves; frames produced
//! in between are multicast over a broadcast channel.
//!
//! Subscriber count and the live fetch slot sit behind one mutex so that
//! subscribe, unsubscribe and fetch completion are serialized. A fetch that ends
//! on its own clears its slot and sends the terminal event while holding that
//! lock, so a subscriber either sees the terminal event or starts a new fetch.
//! Frames are published under the same lock and only while their fetch still
//! owns the slot, so a subscriber never sees frames from a superseded fetch.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::buffer::{BufferPool, DeferredReclaim};
use crate::error::{Error, Result};
use crate::media::{Frame, FrameDemuxer};
use crate::stats::{CameraStats, FrameRateMeter};

use super::config::RegistryConfig;
use super::id::CameraId;
use super::source::{open_upstream, SourceDescriptor};

/// Event delivered to camera subscribers
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// A complete frame
    Frame(Frame),
    /// The upstream ended normally
    Completed,
    /// The upstream fetch failed
    Failed(Arc<Error>),
}

impl FrameEvent {
    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FrameEvent::Frame(_))
    }
}

/// State shared by every camera of one registry
pub(crate) struct RegistryShared {
    pub(crate) config: RegistryConfig,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) reclaim: DeferredReclaim,
    pub(crate) http: reqwest::Client,
}

struct LiveFetch {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct CameraState {
    subscribers: usize,
    generation: u64,
    live: Option<LiveFetch>,
}

/// A single logical camera and its shared upstream fetch
pub struct Camera {
    id: CameraId,
    source: SourceDescriptor,
    shared: Arc<RegistryShared>,
    tx: broadcast::Sender<FrameEvent>,
    state: Mutex<CameraState>,
    fetches_started: AtomicU64,
    frames_published: AtomicU64,
    bytes_published: AtomicU64,
    last_fps: AtomicU32,
}

impl Camera {
    pub(crate) fn new(id: CameraId, source: SourceDescriptor, shared: Arc<RegistryShared>) -> Self {
        let (tx, _) = broadcast::channel(shared.config.broadcast_capacity);

        Self {
            id,
            source,
            shared,
            tx,
            state: Mutex::new(CameraState::default()),
            fetches_started: AtomicU64::new(0),
            frames_published: AtomicU64::new(0),
            bytes_published: AtomicU64::new(0),
            last_fps: AtomicU32::new(0),
        }
    }

    /// Get the camera id
    pub fn id(&self) -> &CameraId {
        &self.id
    }

    /// Get the upstream source
    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    /// Attach a subscriber, starting the upstream fetch if none is running
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let mut state = self.lock_state();

        let rx = self.tx.subscribe();
        state.subscribers += 1;

        let running = state
            .live
            .as_ref()
            .map(|live| !live.handle.is_finished())
            .unwrap_or(false);
        if !running {
            self.start_fetch(&mut state);
        }

        tracing::debug!(
            camera = %self.id,
            subscribers = state.subscribers,
            "Subscriber added"
        );

        Subscription {
            camera: Some(Arc::clone(self)),
            rx,
        }
    }

    /// Get the current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.lock_state().subscribers
    }

    /// Whether an upstream fetch is currently running
    pub fn is_live(&self) -> bool {
        self.lock_state().live.is_some()
    }

    /// Get a snapshot of camera statistics
    pub fn stats(&self) -> CameraStats {
        let (subscribers, live) = {
            let state = self.lock_state();
            (state.subscribers, state.live.is_some())
        };

        CameraStats {
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            live,
            subscribers,
            frames_published: self.frames_published.load(Ordering::Relaxed),
            bytes_published: self.bytes_published.load(Ordering::Relaxed),
            last_fps: self.last_fps.load(Ordering::Relaxed),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CameraState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_fetch(self: &Arc<Self>, state: &mut CameraState) {
        if let Some(stale) = state.live.take() {
            stale.cancel.cancel();
        }

        state.generation += 1;
        let generation = state.generation;
        let cancel = CancellationToken::new();

        let camera = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            camera.run_fetch(generation, token).await;
        });

        self.fetches_started.fetch_add(1, Ordering::Relaxed);
        state.live = Some(LiveFetch {
            generation,
            cancel,
            handle,
        });
    }

    fn release(&self) {
        let mut state = self.lock_state();
        state.subscribers = state.subscribers.saturating_sub(1);

        tracing::debug!(
            camera = %self.id,
            subscribers = state.subscribers,
            "Subscriber removed"
        );

        if state.subscribers == 0 {
            if let Some(live) = state.live.take() {
                live.cancel.cancel();
                tracing::info!(camera = %self.id, "Last subscriber left, stopping upstream fetch");
            }
        }
    }

    async fn run_fetch(self: Arc<Self>, generation: u64, cancel: CancellationToken) {
        tracing::info!(
            camera = %self.id,
            source = %self.source,
            generation = generation,
            "Upstream fetch started"
        );

        let result = self.pump(generation, &cancel).await;

        if cancel.is_cancelled() {
            tracing::debug!(camera = %self.id, generation = generation, "Upstream fetch cancelled");
            return;
        }

        let event = match result {
            Ok(()) => {
                tracing::info!(camera = %self.id, "Upstream stream ended");
                FrameEvent::Completed
            }
            Err(e) => {
                tracing::warn!(camera = %self.id, source = %self.source, error = %e, "Upstream fetch failed");
                FrameEvent::Failed(Arc::new(e))
            }
        };

        let mut state = self.lock_state();
        let current = state
            .live
            .as_ref()
            .map(|live| live.generation == generation)
            .unwrap_or(false);
        if current {
            state.live = None;
            let _ = self.tx.send(event);
        }
    }

    async fn pump(&self, generation: u64, cancel: &CancellationToken) -> Result<()> {
        let reader = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            reader = open_upstream(&self.source, &self.shared.http) => reader?,
        };

        let mut demuxer = FrameDemuxer::new(
            reader,
            Arc::clone(&self.shared.pool),
            self.shared.config.demux.clone(),
        );
        let mut meter = FrameRateMeter::new();

        while let Some(frame) = demuxer.read_frame(cancel).await? {
            if let Some(fps) = meter.record(Instant::now()) {
                self.last_fps.store(fps, Ordering::Relaxed);
                tracing::debug!(camera = %self.id, fps = fps, "Frames received per second");
            }
            if !self.publish(generation, frame) {
                break;
            }
        }

        tracing::debug!(
            camera = %self.id,
            frames = demuxer.frames(),
            bytes = demuxer.bytes_read(),
            "Upstream reader finished"
        );
        Ok(())
    }

    /// Multicast a frame if `generation` still owns the live slot
    ///
    /// Returns `false` once the fetch has been released or replaced.
    fn publish(&self, generation: u64, frame: Frame) -> bool {
        let state = self.lock_state();
        let current = state
            .live
            .as_ref()
            .map(|live| live.generation == generation)
            .unwrap_or(false);
        if !current {
            return false;
        }

        self.frames_published.fetch_add(1, Ordering::Relaxed);
        self.bytes_published
            .fetch_add(frame.len() as u64, Ordering::Relaxed);

        self.shared.reclaim.schedule(&frame);

        // No receivers is not an error, the last subscriber may be leaving
        let _ = self.tx.send(FrameEvent::Frame(frame));
        true
    }
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("id", &self.id)
            .field("source", &self.source)
            .finish()
    }
}

/// A subscriber's handle on a camera's frame stream
///
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    camera: Option<Arc<Camera>>,
    rx: broadcast::Receiver<FrameEvent>,
}

impl Subscription {
    /// Receive the next event
    ///
    /// Frames missed because this subscriber fell behind are skipped.
    pub async fn recv(&mut self) -> FrameEvent {
        loop {
            match self.rx.recv().await {
                Ok(event) => return event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::trace!(missed = missed, "Subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return FrameEvent::Completed,
            }
        }
    }

    /// Get the camera this subscription is attached to
    pub fn camera(&self) -> Option<&Arc<Camera>> {
        self.camera.as_ref()
    }

    /// Detach from the camera
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    pub(crate) fn receiver(&mut self) -> &mut broadcast::Receiver<FrameEvent> {
        &mut self.rx
    }

    /// Wrap a bare receiver, not attached to any camera
    #[cfg(test)]
    pub(crate) fn from_receiver(rx: broadcast::Receiver<FrameEvent>) -> Self {
        Self { camera: None, rx }
    }

    fn detach(&mut self) {
        if let Some(camera) = self.camera.take() {
            camera.release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("camera", &self.camera.as_ref().map(|c| c.id()))
            .finish()
    }
}
