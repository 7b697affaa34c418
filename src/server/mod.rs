//! HTTP front end
//!
//! Serves `GET /camera/{id}` as multipart MJPEG and `GET /video/{id}?fr=N` as
//! fragmented MP4.

pub mod config;
pub mod listener;
pub mod request;

pub use config::ServerConfig;
pub use listener::RelayServer;
pub use request::Route;
