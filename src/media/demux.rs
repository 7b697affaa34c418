//! Delimiter-based frame demuxer
//!
//! An MJPEG camera sends an endless byte stream in which every image starts with
//! a header sequence (JPEG SOI, `FF D8 FF`) and ends with a footer sequence
//! (JPEG EOI, `FF D9`). Anything between images (multipart boundaries, part
//! headers) is skipped.
//!
//! ```text
//!  upstream ──read──► scratch ──append──► accumulation buffer
//!                                          │ junk │FF D8 FF ... FF D9│ tail...
//!                                                 ▲                 ▲
//!                                          header_index        footer end
//!                                                 └──── frame ──────┘ copied into a pooled buffer
//! ```
//!
//! Once a header is found its index is cached until the frame is emitted. The
//! footer search then starts `3/4` of the previous frame length past the header,
//! on the assumption that consecutive frames are of similar size. This avoids
//! rescanning the whole accumulated region after every read. It is a best-effort
//! heuristic: if frame sizes shrink sharply, the footer of the current image can
//! fall inside the skipped window and the next image's footer is used instead.
//! Frames longer than `max_frame_size` are treated as such a miss and dropped.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::buffer::BufferPool;
use crate::error::{Error, Result};

use super::frame::Frame;
use super::search::find;

/// JPEG start-of-image marker followed by the first marker byte
pub const JPEG_HEADER: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// JPEG end-of-image marker
pub const JPEG_FOOTER: [u8; 2] = [0xFF, 0xD9];

/// Frame start and end markers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    header: Vec<u8>,
    footer: Vec<u8>,
}

impl Delimiters {
    /// Create delimiters from header and footer sequences
    pub fn new(header: impl Into<Vec<u8>>, footer: impl Into<Vec<u8>>) -> Result<Self> {
        let header = header.into();
        let footer = footer.into();
        if header.is_empty() || footer.is_empty() {
            return Err(Error::InvalidConfig(
                "frame delimiters must not be empty".into(),
            ));
        }
        Ok(Self { header, footer })
    }

    /// JPEG SOI / EOI markers
    pub fn jpeg() -> Self {
        Self {
            header: JPEG_HEADER.to_vec(),
            footer: JPEG_FOOTER.to_vec(),
        }
    }

    /// Frame start marker
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Frame end marker
    pub fn footer(&self) -> &[u8] {
        &self.footer
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::jpeg()
    }
}

/// Demuxer configuration
#[derive(Debug, Clone)]
pub struct DemuxConfig {
    /// Frame start/end markers
    pub delimiters: Delimiters,

    /// Size of each upstream read
    pub read_chunk_size: usize,

    /// Frames longer than this are discarded and the search resyncs
    pub max_frame_size: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            delimiters: Delimiters::jpeg(),
            read_chunk_size: 32 * 1024, // 32KB
            max_frame_size: 16 * 1024 * 1024,
        }
    }
}

impl DemuxConfig {
    /// Set frame delimiters
    pub fn delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    /// Set upstream read size
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}

/// Per-connection parse state
struct DemuxCursor {
    /// Accumulated unconsumed bytes; `len()` is the write position
    buffer: Vec<u8>,
    /// Header position of the frame being assembled
    header_index: Option<usize>,
    /// Length of the last emitted frame, seeds the footer search
    last_frame_len: usize,
    /// Frames emitted so far
    frames: u64,
}

impl DemuxCursor {
    /// Drop the frame starting at `header_index` and search for the next header
    fn resync(&mut self, header_index: usize, max_frame_size: usize) {
        tracing::warn!(
            max_frame_size,
            buffered = self.buffer.len(),
            "Frame exceeds size limit, resyncing on next header"
        );
        self.buffer.drain(..=header_index);
        self.header_index = None;
        self.last_frame_len = 0;
    }
}

/// Splits an upstream byte stream into delimited frames
pub struct FrameDemuxer<R> {
    reader: R,
    pool: Arc<BufferPool>,
    config: DemuxConfig,
    scratch: Vec<u8>,
    cursor: DemuxCursor,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> FrameDemuxer<R> {
    /// Create a demuxer reading from `reader`
    pub fn new(reader: R, pool: Arc<BufferPool>, config: DemuxConfig) -> Self {
        let mut scratch = pool.take(config.read_chunk_size);
        scratch.resize(config.read_chunk_size, 0);
        let buffer = pool.take(config.read_chunk_size);

        Self {
            reader,
            pool,
            config,
            scratch,
            cursor: DemuxCursor {
                buffer,
                header_index: None,
                last_frame_len: 0,
                frames: 0,
            },
            bytes_read: 0,
        }
    }

    /// Read the next complete frame
    ///
    /// Returns `Ok(None)` when the upstream ends or once `cancel` has fired, even
    /// if complete frames are still buffered. A truncated trailing frame is not
    /// an error.
    pub async fn read_frame(&mut self, cancel: &CancellationToken) -> Result<Option<Frame>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(frame) = self.extract_frame() {
                return Ok(Some(frame));
            }

            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                n = self.reader.read(&mut self.scratch) => n?,
            };
            if n == 0 {
                return Ok(None);
            }

            self.bytes_read += n as u64;
            self.append(n);
        }
    }

    /// Total bytes read from upstream
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Number of frames emitted
    pub fn frames(&self) -> u64 {
        self.cursor.frames
    }

    /// Bytes currently buffered and not yet part of an emitted frame
    pub fn buffered(&self) -> usize {
        self.cursor.buffer.len()
    }

    fn append(&mut self, n: usize) {
        let buffer = &mut self.cursor.buffer;
        if buffer.capacity() - buffer.len() < n {
            let wanted = (buffer.capacity() * 2).max(buffer.len() + n);
            let mut grown = self.pool.take(wanted);
            grown.extend_from_slice(buffer);
            let old = std::mem::replace(buffer, grown);
            self.pool.give_back(old);
        }
        buffer.extend_from_slice(&self.scratch[..n]);
    }

    fn extract_frame(&mut self) -> Option<Frame> {
        let header = self.config.delimiters.header();
        let footer = self.config.delimiters.footer();

        loop {
            let buffer = &mut self.cursor.buffer;

            let start = match self.cursor.header_index {
                Some(index) => index,
                None => match find(buffer, header, 0) {
                    Some(index) => {
                        self.cursor.header_index = Some(index);
                        index
                    }
                    None => {
                        // Keep only what could be the start of a split header
                        let keep = (header.len() - 1).min(buffer.len());
                        buffer.drain(..buffer.len() - keep);
                        return None;
                    }
                },
            };

            let skip = (self.cursor.last_frame_len * 3 / 4).max(header.len());
            let end = match find(buffer, footer, start + skip) {
                Some(index) => index + footer.len(),
                None if buffer.len() - start > self.config.max_frame_size => {
                    self.cursor.resync(start, self.config.max_frame_size);
                    continue;
                }
                None => return None,
            };

            let frame_len = end - start;
            if frame_len > self.config.max_frame_size {
                self.cursor.resync(start, self.config.max_frame_size);
                continue;
            }

            let mut data = self.pool.take(frame_len);
            data.extend_from_slice(&buffer[start..end]);
            buffer.drain(..end);

            self.cursor.header_index = None;
            self.cursor.last_frame_len = frame_len;
            self.cursor.frames += 1;

            return Some(Frame::new(data, self.cursor.frames));
        }
    }
}

impl<R> Drop for FrameDemuxer<R> {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.cursor.buffer));
        self.pool.give_back(std::mem::take(&mut self.scratch));
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn counting(n: usize) -> impl Iterator<Item = u8> {
        (0..n).map(|x| x as u8)
    }

    fn jpeg(fill: u8, payload: usize) -> Vec<u8> {
        let mut frame = JPEG_HEADER.to_vec();
        frame.extend(std::iter::repeat(fill).take(payload));
        frame.extend_from_slice(&JPEG_FOOTER);
        frame
    }

    fn demuxer<R: AsyncRead + Unpin>(reader: R) -> FrameDemuxer<R> {
        FrameDemuxer::new(reader, Arc::new(BufferPool::new()), DemuxConfig::default())
    }

    #[tokio::test]
    async fn test_no_frame_returns_none() {
        let data: Vec<u8> = counting(1000).collect();
        let mut demux = demuxer(Cursor::new(data));

        let frame = demux.read_frame(&CancellationToken::new()).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_single_frame() {
        let mut data: Vec<u8> = counting(1000).collect();
        data.extend_from_slice(&JPEG_HEADER);
        data.extend(counting(1000));
        data.extend_from_slice(&JPEG_FOOTER);
        data.extend(counting(1000));

        let mut demux = demuxer(Cursor::new(data));
        let cancel = CancellationToken::new();

        let frame = demux.read_frame(&cancel).await.unwrap().unwrap();
        assert_eq!(frame.len(), 1005);
        assert_eq!(&frame.as_bytes()[..3], &JPEG_HEADER);
        assert_eq!(&frame.as_bytes()[1003..], &JPEG_FOOTER);

        assert!(demux.read_frame(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_two_frames_in_order() {
        let mut data: Vec<u8> = counting(1000).collect();
        data.extend(jpeg(0x0F, 1000));
        data.extend(counting(1000));
        data.extend(jpeg(0x0A, 1000));
        data.extend(counting(1000));

        let mut demux = demuxer(Cursor::new(data));
        let cancel = CancellationToken::new();

        let first = demux.read_frame(&cancel).await.unwrap().unwrap();
        assert_eq!(first.len(), 1005);
        assert_eq!(&first.as_bytes()[..3], &JPEG_HEADER);
        assert_eq!(&first.as_bytes()[1003..], &JPEG_FOOTER);
        assert!(first.as_bytes()[3..1003].iter().all(|&b| b == 0x0F));

        let second = demux.read_frame(&cancel).await.unwrap().unwrap();
        assert_eq!(second.len(), 1005);
        assert_eq!(&second.as_bytes()[..3], &JPEG_HEADER);
        assert_eq!(&second.as_bytes()[1003..], &JPEG_FOOTER);
        assert!(second.as_bytes()[3..1003].iter().all(|&b| b == 0x0A));

        assert!(first.sequence() < second.sequence());
        assert!(demux.read_frame(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delimiters_split_across_reads() {
        let frame = jpeg(0x11, 500);
        let mock = tokio_test::io::Builder::new()
            .read(b"--boundary\r\nContent-Type: image/jpeg\r\n\r\n\xFF")
            .read(&frame[1..300])
            .read(&frame[300..frame.len() - 1])
            .read(&frame[frame.len() - 1..])
            .read(b"\r\n")
            .build();

        let mut demux = demuxer(mock);
        let cancel = CancellationToken::new();

        let out = demux.read_frame(&cancel).await.unwrap().unwrap();
        assert_eq!(out.as_bytes(), &frame[..]);
        assert!(demux.read_frame(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_buffer_grows_for_large_frames() {
        let pool = Arc::new(BufferPool::new());
        let config = DemuxConfig::default().read_chunk_size(1024);
        let frame = jpeg(0x22, 10_000);

        let mut demux = FrameDemuxer::new(Cursor::new(frame.clone()), pool, config);
        let out = demux
            .read_frame(&CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(out.len(), frame.len());
        assert_eq!(out.as_bytes(), &frame[..]);
    }

    #[tokio::test]
    async fn test_junk_is_not_accumulated() {
        let data: Vec<u8> = std::iter::repeat(0u8).take(200_000).collect();
        let config = DemuxConfig::default().read_chunk_size(4096);
        let mut demux = FrameDemuxer::new(Cursor::new(data), Arc::new(BufferPool::new()), config);

        assert!(demux
            .read_frame(&CancellationToken::new())
            .await
            .unwrap()
            .is_none());
        assert_eq!(demux.bytes_read(), 200_000);
        assert!(demux.buffered() < JPEG_HEADER.len());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_skipped() {
        let mut data = JPEG_HEADER.to_vec();
        data.extend(std::iter::repeat(0x33).take(500)); // header with no footer
        data.extend(jpeg(0x44, 50));

        let config = DemuxConfig::default().max_frame_size(200);
        let mut demux = FrameDemuxer::new(Cursor::new(data), Arc::new(BufferPool::new()), config);

        let out = demux
            .read_frame(&CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.len(), 55);
        assert!(out.as_bytes()[3..53].iter().all(|&b| b == 0x44));
    }

    #[tokio::test]
    async fn test_cancel_returns_none() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut demux = demuxer(reader);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(demux.read_frame(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_discards_buffered_frames() {
        let mut data = jpeg(0x01, 20);
        data.extend(jpeg(0x02, 20));
        data.extend(jpeg(0x03, 20));
        let mut demux = demuxer(Cursor::new(data));
        let cancel = CancellationToken::new();

        let first = demux.read_frame(&cancel).await.unwrap().unwrap();
        assert_eq!(first.sequence(), 1);
        assert!(demux.buffered() > 0);

        cancel.cancel();
        assert!(demux.read_frame(&cancel).await.unwrap().is_none());
        assert_eq!(demux.frames(), 1);
    }

    #[tokio::test]
    async fn test_read_error_propagates() {
        let mock = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let mut demux = demuxer(mock);

        let result = demux.read_frame(&CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_buffers_returned_on_drop() {
        let pool = Arc::new(BufferPool::new());
        let demux = FrameDemuxer::new(
            Cursor::new(Vec::new()),
            Arc::clone(&pool),
            DemuxConfig::default(),
        );
        drop(demux);

        assert_eq!(pool.stats().returned, 2);
    }
}
