//! Minimal HTTP request head parsing and routing
//!
//! Only the request line matters to the relay. Headers are read to find the end
//! of the head and otherwise ignored.

use crate::registry::CameraId;

/// End of an HTTP request head
pub const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A routed viewer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET /camera/{id}`: multipart MJPEG
    Mjpeg(CameraId),
    /// `GET /video/{id}?fr=N`: fragmented MP4
    Mp4 {
        /// Camera to transcode
        camera: CameraId,
        /// Requested frame rate, if any
        frame_rate: Option<u32>,
    },
    /// Method other than GET
    MethodNotAllowed,
    /// Anything else
    NotFound,
}

/// Parse a request head and route it
///
/// Returns `None` if the head has no well-formed request line.
pub fn route(head: &[u8]) -> Option<Route> {
    let head = std::str::from_utf8(head).ok()?;
    let line = head.lines().next()?;

    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }

    if method != "GET" {
        return Some(Route::MethodNotAllowed);
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    let mut segments = path.trim_start_matches('/').split('/');
    let route = match (segments.next(), segments.next(), segments.next()) {
        (Some("camera"), Some(id), None) if !id.is_empty() => Route::Mjpeg(CameraId::new(id)),
        (Some("video"), Some(id), None) if !id.is_empty() => Route::Mp4 {
            camera: CameraId::new(id),
            frame_rate: query.and_then(|q| query_param(q, "fr")).and_then(|v| v.parse().ok()),
        },
        _ => Route::NotFound,
    };

    Some(route)
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_mjpeg() {
        let head = b"GET /camera/lobby HTTP/1.1\r\nHost: relay\r\n\r\n";
        assert_eq!(route(head), Some(Route::Mjpeg(CameraId::new("lobby"))));
    }

    #[test]
    fn test_route_mp4_with_frame_rate() {
        let head = b"GET /video/garage?fr=15 HTTP/1.1\r\n\r\n";
        assert_eq!(
            route(head),
            Some(Route::Mp4 {
                camera: CameraId::new("garage"),
                frame_rate: Some(15),
            })
        );
    }

    #[test]
    fn test_route_mp4_bad_frame_rate() {
        let head = b"GET /video/garage?x=1&fr=fast HTTP/1.1\r\n\r\n";
        assert_eq!(
            route(head),
            Some(Route::Mp4 {
                camera: CameraId::new("garage"),
                frame_rate: None,
            })
        );
    }

    #[test]
    fn test_route_not_found() {
        assert_eq!(route(b"GET / HTTP/1.1\r\n\r\n"), Some(Route::NotFound));
        assert_eq!(route(b"GET /camera/ HTTP/1.1\r\n\r\n"), Some(Route::NotFound));
        assert_eq!(route(b"GET /camera/a/b HTTP/1.1\r\n\r\n"), Some(Route::NotFound));
    }

    #[test]
    fn test_route_method() {
        assert_eq!(
            route(b"POST /camera/lobby HTTP/1.1\r\n\r\n"),
            Some(Route::MethodNotAllowed)
        );
    }

    #[test]
    fn test_route_malformed() {
        assert_eq!(route(b"garbage\r\n\r\n"), None);
        assert_eq!(route(b"GET /camera/lobby\r\n\r\n"), None);
        assert_eq!(route(&[0xFF, 0xFE, 0x00]), None);
    }
}
