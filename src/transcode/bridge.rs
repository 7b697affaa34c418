//! External encoder process bridge
//!
//! ```text
//!  LatestSampler ──feeder task──► stdin ┌─────────┐ stdout ──► read()
//!                                       │ encoder │
//!                                       └─────────┘ stderr ──► tracing
//! ```
//!
//! The feeder and the reader are independent. They share one cancellation
//! token, and `shutdown` stops both and reaps the process.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::registry::FrameEvent;
use crate::session::LatestSampler;

use super::config::EncoderConfig;

/// Why the feeder stopped writing to the encoder
#[derive(Debug, Clone)]
pub enum FeedEnd {
    /// The bridge was shut down
    Cancelled,
    /// The camera stream ended normally
    SourceEnded,
    /// The camera stream failed
    SourceFailed(Arc<Error>),
    /// The encoder stopped accepting input
    EncoderClosed,
}

/// A running encoder fed from a camera
pub struct TranscodeBridge {
    child: Child,
    stdout: ChildStdout,
    cancel: CancellationToken,
    feeder: Option<JoinHandle<FeedEnd>>,
    stderr: Option<JoinHandle<()>>,
}

impl TranscodeBridge {
    /// Launch the encoder and start feeding it frames from `sampler`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(sampler: LatestSampler, config: &EncoderConfig) -> Result<Self> {
        let mut child = Command::new(&config.program)
            .args(config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(Error::ProcessLaunch)?;

        let (stdin, stdout, stderr) =
            match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
                (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
                _ => {
                    return Err(Error::ProcessLaunch(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "encoder pipes not captured",
                    )))
                }
            };

        let pid = child.id();
        tracing::debug!(program = %config.program, pid = ?pid, "Encoder started");

        let cancel = CancellationToken::new();
        let feeder = tokio::spawn(feed(sampler, stdin, cancel.clone()));
        let stderr = tokio::spawn(log_stderr(stderr, pid));

        Ok(Self {
            child,
            stdout,
            cancel,
            feeder: Some(feeder),
            stderr: Some(stderr),
        })
    }

    /// Read encoded output
    ///
    /// Returns `Ok(0)` once the encoder has closed its output.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stdout.read(buf).await?)
    }

    /// Process id of the encoder, if still running
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Stop feeding, terminate the encoder if needed and wait for it
    pub async fn shutdown(mut self) -> FeedEnd {
        self.cancel.cancel();

        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(status = %status, "Encoder exited");
            }
            _ => {
                if let Err(e) = self.child.kill().await {
                    tracing::debug!(error = %e, "Failed to kill encoder");
                } else {
                    tracing::debug!("Encoder terminated");
                }
            }
        }

        if let Some(stderr) = self.stderr.take() {
            let _ = stderr.await;
        }

        match self.feeder.take() {
            Some(feeder) => feeder.await.unwrap_or(FeedEnd::Cancelled),
            None => FeedEnd::Cancelled,
        }
    }
}

impl Drop for TranscodeBridge {
    fn drop(&mut self) {
        // The child itself is killed by kill_on_drop
        self.cancel.cancel();
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }
    }
}

async fn feed(mut sampler: LatestSampler, mut stdin: ChildStdin, cancel: CancellationToken) -> FeedEnd {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return FeedEnd::Cancelled,
            event = sampler.next() => event,
        };

        let frame = match event {
            FrameEvent::Frame(frame) => frame,
            FrameEvent::Completed => return FeedEnd::SourceEnded,
            FrameEvent::Failed(e) => return FeedEnd::SourceFailed(e),
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => return FeedEnd::Cancelled,
            written = write_frame(&mut stdin, frame.as_bytes()) => written,
        };

        if let Err(e) = written {
            tracing::debug!(error = %e, "Encoder input closed");
            return FeedEnd::EncoderClosed;
        }
    }
}

async fn write_frame(stdin: &mut ChildStdin, bytes: &[u8]) -> std::io::Result<()> {
    stdin.write_all(bytes).await?;
    stdin.flush().await
}

async fn log_stderr(stderr: ChildStderr, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(pid = ?pid, "encoder: {}", line);
    }
}
