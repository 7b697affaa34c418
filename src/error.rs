//! Error types
//!
//! Every failure in the relay is scoped to one camera fetch, one viewer session or
//! one encoder process. Errors that have to reach several subscribers at once are
//! shared as `Arc<Error>`.

use std::io;

use crate::registry::CameraId;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for relay operations
#[derive(Debug)]
pub enum Error {
    /// I/O failure on an upstream stream, a pipe or a socket
    Io(io::Error),
    /// HTTP client failure while fetching a camera stream
    Http(reqwest::Error),
    /// Camera answered with a non-success HTTP status
    UpstreamStatus(u16),
    /// No source is known for this camera id
    UnknownCamera(CameraId),
    /// The external encoder could not be started
    ProcessLaunch(io::Error),
    /// Configuration rejected before use
    InvalidConfig(String),
}

impl Error {
    /// Whether the error is a peer going away rather than a real fault
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Http(e) => write!(f, "Upstream fetch failed: {}", e),
            Error::UpstreamStatus(status) => {
                write!(f, "Upstream returned HTTP status {}", status)
            }
            Error::UnknownCamera(id) => write!(f, "Unknown camera: {}", id),
            Error::ProcessLaunch(e) => write!(f, "Failed to launch encoder: {}", e),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) | Error::ProcessLaunch(e) => Some(e),
            Error::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        let gone = Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert!(gone.is_disconnect());

        let other = Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(!other.is_disconnect());

        assert!(!Error::UpstreamStatus(503).is_disconnect());
    }

    #[test]
    fn test_display() {
        let err = Error::UnknownCamera(CameraId::new("lobby"));
        assert_eq!(err.to_string(), "Unknown camera: lobby");

        let err = Error::UpstreamStatus(404);
        assert_eq!(err.to_string(), "Upstream returned HTTP status 404");
    }
}
