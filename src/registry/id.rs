//! Camera identifiers

/// Opaque camera identifier as requested by viewers (e.g. "lobby")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(String);

impl CameraId {
    /// Create a new camera id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CameraId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
