//! Drop-to-latest frame sampling
//!
//! A viewer that reads slower than the camera produces must not build a backlog.
//! `LatestSampler` treats the subscription's broadcast ring as a single-slot
//! mailbox: each pull waits for at least one event, then drains whatever else
//! is already queued and returns only the newest frame.

use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::registry::{FrameEvent, Subscription};

/// Pulls the most recent frame from a camera subscription
#[derive(Debug)]
pub struct LatestSampler {
    subscription: Subscription,
    terminal: Option<FrameEvent>,
    last_sequence: u64,
    dropped: u64,
}

impl LatestSampler {
    /// Wrap a subscription
    pub fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            terminal: None,
            last_sequence: 0,
            dropped: 0,
        }
    }

    /// Wait for the newest frame
    ///
    /// Blocks only when nothing arrived since the previous call. Frames that
    /// were superseded in the meantime are discarded. Once a terminal event
    /// has been returned every later call returns it again.
    pub async fn next(&mut self) -> FrameEvent {
        if let Some(terminal) = &self.terminal {
            return terminal.clone();
        }

        let mut latest = loop {
            match self.subscription.receiver().recv().await {
                Ok(event) => break event,
                Err(RecvError::Lagged(missed)) => self.dropped += missed,
                Err(RecvError::Closed) => break FrameEvent::Completed,
            }
        };

        while !latest.is_terminal() {
            match self.subscription.receiver().try_recv() {
                Ok(event) => {
                    if event.is_terminal() {
                        // Deliver the frame we hold now, end on the next pull
                        self.terminal = Some(event);
                        break;
                    }
                    self.dropped += 1;
                    latest = event;
                }
                Err(TryRecvError::Lagged(missed)) => self.dropped += missed,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => {
                    self.terminal = Some(FrameEvent::Completed);
                    break;
                }
            }
        }

        match &latest {
            FrameEvent::Frame(frame) => self.last_sequence = frame.sequence(),
            terminal => self.terminal = Some(terminal.clone()),
        }

        latest
    }

    /// Number of frames discarded because a newer one was available
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Sequence number of the last frame returned
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Whether a terminal event has been returned or is pending
    pub fn is_finished(&self) -> bool {
        self.terminal.is_some()
    }
}
