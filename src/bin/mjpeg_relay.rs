//! MJPEG relay server
//!
//! Run with: mjpeg-relay [BIND_ADDR] [ID=SOURCE ...]
//!
//! Examples:
//!   mjpeg-relay lobby=http://10.0.0.20/mjpg/video.mjpg
//!   mjpeg-relay 127.0.0.1:8081 lobby=http://10.0.0.20/video garage=/dev/video0
//!
//! Viewers:
//!   http://localhost:8080/camera/lobby          multipart MJPEG
//!   http://localhost:8080/video/lobby?fr=15     fragmented MP4
//!
//! The encoder program defaults to `ffmpeg` and can be overridden with the
//! `MJPEG_RELAY_FFMPEG` environment variable.

use std::net::SocketAddr;
use std::sync::Arc;

use mjpeg_relay::{
    CameraRegistry, EncoderConfig, RelayServer, ServerConfig, SourceDescriptor, StaticResolver,
};

const DEFAULT_PORT: u16 = 8080;

/// Parse a bind address
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8080
/// - "localhost:8081" -> 127.0.0.1:8081
/// - "0.0.0.0" -> 0.0.0.0:8080
/// - "0.0.0.0:9000" -> 0.0.0.0:9000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

/// Parse an `ID=SOURCE` camera mapping
fn parse_camera(arg: &str) -> Result<(String, SourceDescriptor), String> {
    match arg.split_once('=') {
        Some((id, source)) if !id.is_empty() && !source.is_empty() => {
            Ok((id.to_string(), SourceDescriptor::parse(source)))
        }
        _ => Err(format!(
            "Invalid camera: '{}'. Expected format: ID=URL or ID=DEVICE",
            arg
        )),
    }
}

fn print_usage() {
    eprintln!("Usage: mjpeg-relay [BIND_ADDR] [ID=SOURCE ...]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:{})", DEFAULT_PORT);
    eprintln!("  ID=SOURCE    Camera id and its MJPEG URL or device path");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MJPEG_RELAY_FFMPEG    Encoder program (default: ffmpeg)");
    eprintln!("  RUST_LOG              Log filter (default: mjpeg_relay=info)");
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!();
    print_usage();
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut bind_addr = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT));
    let mut resolver = StaticResolver::new();
    for (i, arg) in args.iter().enumerate() {
        if arg.contains('=') {
            match parse_camera(arg) {
                Ok((id, source)) => resolver.insert(id, source),
                Err(e) => fail(&e),
            }
        } else if i == 0 {
            match parse_bind_addr(arg) {
                Ok(addr) => bind_addr = addr,
                Err(e) => fail(&e),
            }
        } else {
            fail(&format!("Unexpected argument: '{}'", arg));
        }
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mjpeg_relay=info".parse()?),
        )
        .init();

    if resolver.is_empty() {
        tracing::warn!("No cameras configured, every request will get 404");
    }

    let mut encoder = EncoderConfig::default();
    if let Ok(program) = std::env::var("MJPEG_RELAY_FFMPEG") {
        encoder = encoder.program(program);
    }

    let config = ServerConfig::with_addr(bind_addr).encoder(encoder);
    let registry = Arc::new(CameraRegistry::new(resolver)?);
    let server = RelayServer::new(config, registry);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_addr() {
        assert_eq!(
            parse_bind_addr("localhost").unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_bind_addr("0.0.0.0:9000").unwrap(),
            "0.0.0.0:9000".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_bind_addr("not-an-addr").is_err());
    }

    #[test]
    fn test_parse_camera() {
        let (id, source) = parse_camera("lobby=http://cam/video").unwrap();
        assert_eq!(id, "lobby");
        assert_eq!(source, SourceDescriptor::http("http://cam/video"));

        let (_, source) = parse_camera("garage=/dev/video0").unwrap();
        assert_eq!(source, SourceDescriptor::device("/dev/video0"));

        assert!(parse_camera("=http://cam").is_err());
        assert!(parse_camera("lobby=").is_err());
    }
}
