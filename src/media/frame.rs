//! Frame type shared between the demuxer, subscribers and the reclaimer

use std::sync::Arc;

/// One complete delimited image extracted from an upstream byte stream
///
/// The bytes live in a pooled buffer behind an `Arc`, so cloning a frame for
/// every subscriber only bumps a reference count. A frame is never mutated
/// after it leaves the demuxer.
#[derive(Clone)]
pub struct Frame {
    data: Arc<Vec<u8>>,
    sequence: u64,
}

impl Frame {
    /// Wrap a filled buffer as frame number `sequence` of its stream
    pub fn new(data: Vec<u8>, sequence: u64) -> Self {
        Self {
            data: Arc::new(data),
            sequence,
        }
    }

    /// Frame bytes, header through footer inclusive
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Logical frame length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the frame is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Capacity of the backing buffer (always >= `len()`)
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Position of this frame in the production order of its stream
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Shared handle to the backing buffer, for deferred reclamation
    pub(crate) fn shared_buffer(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.data)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("len", &self.len())
            .finish()
    }
}
