//! Viewer session loops
//!
//! Each viewer owns a `LatestSampler` and a write sink. The loops here never
//! fail because of the sink: a write error means the client is gone and ends
//! the session quietly. Other viewers of the same camera are unaffected.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::media::mjpeg::{part_header, PART_TRAILER};
use crate::registry::FrameEvent;
use crate::transcode::{EncoderConfig, FeedEnd, TranscodeBridge};

use super::latest::LatestSampler;

/// Output buffer size for the MP4 copy loop
const COPY_CHUNK_SIZE: usize = 32 * 1024;

/// Why a viewer session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The cancellation token fired
    Cancelled,
    /// Writing to the client failed
    ClientGone,
    /// The camera stream ended normally
    SourceEnded,
    /// The camera stream failed
    SourceFailed,
    /// The encoder closed its output
    EncoderExited,
}

/// Stream frames to `sink` as `multipart/x-mixed-replace` parts
pub async fn stream_mjpeg<W>(
    mut sampler: LatestSampler,
    mut sink: W,
    cancel: CancellationToken,
    boundary: &str,
) -> SessionEnd
where
    W: AsyncWrite + Unpin,
{
    let mut frames = 0u64;

    let end = loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break SessionEnd::Cancelled,
            event = sampler.next() => event,
        };

        let frame = match event {
            FrameEvent::Frame(frame) => frame,
            FrameEvent::Completed => break SessionEnd::SourceEnded,
            FrameEvent::Failed(e) => {
                tracing::debug!(error = %e, "Camera failed, ending MJPEG session");
                break SessionEnd::SourceFailed;
            }
        };

        let header = part_header(boundary, frame.len());
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break SessionEnd::Cancelled,
            written = write_part(&mut sink, header, frame.as_bytes()) => written,
        };

        if let Err(e) = written {
            log_client_error(e, frames);
            break SessionEnd::ClientGone;
        }
        frames += 1;
    };

    tracing::debug!(
        frames = frames,
        dropped = sampler.dropped(),
        end = ?end,
        "MJPEG session finished"
    );
    end
}

fn log_client_error(err: std::io::Error, delivered: u64) {
    let err = Error::from(err);
    if err.is_disconnect() {
        tracing::debug!(error = %err, delivered = delivered, "Client disconnected");
    } else {
        tracing::warn!(error = %err, delivered = delivered, "Client write failed");
    }
}

async fn write_part<W>(sink: &mut W, header: Bytes, body: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(&header).await?;
    sink.write_all(body).await?;
    sink.write_all(PART_TRAILER).await?;
    sink.flush().await
}

/// Transcode frames to fragmented MP4 and copy the encoder output to `sink`
///
/// Fails only if the encoder cannot be launched.
pub async fn stream_mp4<W>(
    sampler: LatestSampler,
    config: &EncoderConfig,
    sink: W,
    cancel: CancellationToken,
) -> Result<SessionEnd>
where
    W: AsyncWrite + Unpin,
{
    let bridge = TranscodeBridge::start(sampler, config)?;
    Ok(copy_mp4(bridge, sink, cancel).await)
}

/// Copy the output of a running encoder to `sink` until either side ends
pub async fn copy_mp4<W>(
    mut bridge: TranscodeBridge,
    mut sink: W,
    cancel: CancellationToken,
) -> SessionEnd
where
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut copied = 0u64;

    let end = loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => break SessionEnd::Cancelled,
            n = bridge.read(&mut buf) => n,
        };

        let n = match n {
            Ok(0) => break SessionEnd::EncoderExited,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "Encoder output failed");
                break SessionEnd::EncoderExited;
            }
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break SessionEnd::Cancelled,
            written = write_chunk(&mut sink, &buf[..n]) => written,
        };

        if let Err(e) = written {
            log_client_error(e, copied);
            break SessionEnd::ClientGone;
        }
        copied += n as u64;
    };

    let fed = bridge.shutdown().await;
    let end = match (end, fed) {
        (SessionEnd::EncoderExited, FeedEnd::SourceEnded) => SessionEnd::SourceEnded,
        (SessionEnd::EncoderExited, FeedEnd::SourceFailed(_)) => SessionEnd::SourceFailed,
        (end, _) => end,
    };

    tracing::debug!(bytes = copied, end = ?end, "MP4 session finished");
    end
}

async fn write_chunk<W>(sink: &mut W, chunk: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(chunk).await?;
    sink.flush().await
}
