//! MJPEG multipart framing for viewers
//!
//! Each frame goes out as one part of a `multipart/x-mixed-replace` body:
//!
//! ```text
//! --<boundary>\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n frame bytes>\r\n
//! ```

use std::fmt::Write;

use bytes::{Bytes, BytesMut};

/// Default multipart boundary
pub const DEFAULT_BOUNDARY: &str = "XXXBoundaryXXX";

/// Line terminator written after each part's body
pub const PART_TRAILER: &[u8] = b"\r\n";

/// `Content-Type` value for the whole multipart response
pub fn content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={}", boundary)
}

/// Header block preceding a frame of `content_length` bytes
pub fn part_header(boundary: &str, content_length: usize) -> Bytes {
    let mut header = BytesMut::with_capacity(boundary.len() + 80);
    // Writing into BytesMut cannot fail
    let _ = write!(
        header,
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        boundary, content_length
    );
    header.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_header() {
        let header = part_header(DEFAULT_BOUNDARY, 1005);
        assert_eq!(
            &header[..],
            b"--XXXBoundaryXXX\r\nContent-Type: image/jpeg\r\nContent-Length: 1005\r\n\r\n"
        );
    }

    #[test]
    fn test_content_type() {
        assert_eq!(
            content_type("abc"),
            "multipart/x-mixed-replace; boundary=abc"
        );
    }
}
