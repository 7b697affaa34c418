//! HTTP relay listener
//!
//! Handles the TCP accept loop and spawns one viewer session per connection.
//! Each connection carries exactly one request; the response body is streamed
//! until the camera ends or the client goes away.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::media::mjpeg;
use crate::registry::CameraRegistry;
use crate::server::config::ServerConfig;
use crate::server::request::{route, Route, HEAD_TERMINATOR};
use crate::session::{copy_mp4, stream_mjpeg, LatestSampler, SessionEnd, ViewerContext, ViewerMode};
use crate::transcode::TranscodeBridge;

const NO_CACHE: &str = "Cache-Control: no-cache, no-store, must-revalidate\r\nPragma: no-cache\r\n";

/// MJPEG relay server
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<CameraRegistry>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a new server serving cameras from `registry`
    pub fn new(config: ServerConfig, registry: Arc<CameraRegistry>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            registry,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the camera registry
    pub fn registry(&self) -> &Arc<CameraRegistry> {
        &self.registry
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "MJPEG relay listening");

        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(addr = ?listener.local_addr().ok(), "MJPEG relay listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            let _permit = permit;

            match serve_connection(session_id, socket, peer_addr, config, registry).await {
                Ok(()) => {}
                Err(e) if e.is_disconnect() => {
                    tracing::debug!(session_id = session_id, error = %e, "Client disconnected");
                }
                Err(e) => {
                    tracing::warn!(session_id = session_id, error = %e, "Connection error");
                }
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}

async fn serve_connection(
    session_id: u64,
    mut socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    registry: Arc<CameraRegistry>,
) -> Result<()> {
    let head = match tokio::time::timeout(
        config.request_timeout,
        read_head(&mut socket, config.max_request_size),
    )
    .await
    {
        Ok(head) => head?,
        Err(_) => {
            tracing::debug!(session_id = session_id, "Request head timed out");
            return Ok(());
        }
    };

    let Some(head) = head else {
        return respond_status(&mut socket, "400 Bad Request").await;
    };

    let (camera, mode) = match route(&head) {
        Some(Route::Mjpeg(camera)) => (camera, ViewerMode::Mjpeg),
        Some(Route::Mp4 { camera, frame_rate }) => {
            let frame_rate = config.frame_rate_for(frame_rate);
            (camera, ViewerMode::Mp4 { frame_rate })
        }
        Some(Route::MethodNotAllowed) => {
            return respond_status(&mut socket, "405 Method Not Allowed").await
        }
        Some(Route::NotFound) => return respond_status(&mut socket, "404 Not Found").await,
        None => return respond_status(&mut socket, "400 Bad Request").await,
    };

    let context = ViewerContext::new(session_id, peer_addr, camera, mode);
    serve_viewer(context, socket, &config, &registry).await
}

async fn serve_viewer(
    context: ViewerContext,
    mut socket: TcpStream,
    config: &ServerConfig,
    registry: &CameraRegistry,
) -> Result<()> {
    let subscription = match registry.subscribe(&context.camera).await {
        Ok(subscription) => subscription,
        Err(Error::UnknownCamera(id)) => {
            tracing::debug!(session_id = context.session_id, camera = %id, "Unknown camera requested");
            return respond_status(&mut socket, "404 Not Found").await;
        }
        Err(e) => {
            tracing::warn!(camera = %context.camera, error = %e, "Failed to subscribe");
            return respond_status(&mut socket, "500 Internal Server Error").await;
        }
    };
    let sampler = LatestSampler::new(subscription);

    tracing::info!(
        session_id = context.session_id,
        peer = %context.peer_addr,
        camera = %context.camera,
        mode = %context.mode,
        "Viewer started"
    );

    let end = match context.mode {
        ViewerMode::Mjpeg => {
            let content_type = mjpeg::content_type(&config.boundary);
            write_head(&mut socket, "200 OK", &content_type).await?;

            let (read_half, write_half) = socket.into_split();
            let cancel = CancellationToken::new();
            let watcher = tokio::spawn(watch_disconnect(read_half, cancel.clone()));

            let end = stream_mjpeg(sampler, write_half, cancel, &config.boundary).await;
            watcher.abort();
            end
        }
        ViewerMode::Mp4 { frame_rate } => {
            let encoder = config.encoder.clone().frame_rate(frame_rate);
            let bridge = match TranscodeBridge::start(sampler, &encoder) {
                Ok(bridge) => bridge,
                Err(e) => {
                    tracing::error!(
                        session_id = context.session_id,
                        program = %encoder.program,
                        error = %e,
                        "Encoder failed to start"
                    );
                    return respond_status(&mut socket, "500 Internal Server Error").await;
                }
            };
            write_head(&mut socket, "200 OK", "video/mp4").await?;

            let (read_half, write_half) = socket.into_split();
            let cancel = CancellationToken::new();
            let watcher = tokio::spawn(watch_disconnect(read_half, cancel.clone()));

            let end = copy_mp4(bridge, write_half, cancel).await;
            watcher.abort();
            end
        }
    };

    match end {
        SessionEnd::SourceFailed => tracing::warn!(
            session_id = context.session_id,
            camera = %context.camera,
            "Viewer ended, camera failed"
        ),
        end => tracing::info!(
            session_id = context.session_id,
            camera = %context.camera,
            end = ?end,
            "Viewer ended"
        ),
    }

    Ok(())
}

/// Read up to the end of the request head
///
/// Returns `None` if the head is larger than `max_size` or the peer closed
/// before finishing it.
async fn read_head<R>(reader: &mut R, max_size: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }

        // Resume the terminator search just before the new bytes
        let from = head.len().saturating_sub(HEAD_TERMINATOR.len() - 1);
        head.extend_from_slice(&chunk[..n]);

        if let Some(end) = crate::media::find(&head, HEAD_TERMINATOR, from) {
            head.truncate(end + HEAD_TERMINATOR.len());
            return Ok(Some(head));
        }
        if head.len() > max_size {
            return Ok(None);
        }
    }
}

async fn write_head<W>(writer: &mut W, status: &str, content_type: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\n{}Connection: close\r\n\r\n",
        status, content_type, NO_CACHE
    );
    writer.write_all(head.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn respond_status<W>(writer: &mut W, status: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status.len(),
        status
    );
    writer.write_all(response.as_bytes()).await?;
    writer.shutdown().await?;
    Ok(())
}

/// Fire `cancel` once the client closes its side of the connection
///
/// Viewers never send anything after the request head, so EOF on the read
/// half is treated as the client leaving. A client that half-closes its write
/// side after the request therefore ends its own session.
async fn watch_disconnect(mut reader: OwnedReadHalf, cancel: CancellationToken) {
    let mut buf = [0u8; 256];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_head_split() {
        let mut reader = tokio_test::io::Builder::new()
            .read(b"GET /camera/lobby HTTP/1.1\r\nHost: x\r")
            .read(b"\n\r\nextra")
            .build();

        let head = read_head(&mut reader, 1024).await.unwrap().unwrap();
        assert_eq!(head, b"GET /camera/lobby HTTP/1.1\r\nHost: x\r\n\r\n");
    }

    #[tokio::test]
    async fn test_read_head_too_large() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&[b'a'; 64])
            .read(&[b'a'; 64])
            .build();

        assert!(read_head(&mut reader, 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_head_eof() {
        let mut reader = tokio_test::io::Builder::new().read(b"GET /").build();
        assert!(read_head(&mut reader, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_respond_status() {
        let mut writer = tokio_test::io::Builder::new()
            .write(b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 13\r\nConnection: close\r\n\r\n404 Not Found")
            .build();

        respond_status(&mut writer, "404 Not Found").await.unwrap();
    }

    #[tokio::test]
    async fn test_write_head() {
        let mut writer = tokio_test::io::Builder::new()
            .write(b"HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nCache-Control: no-cache, no-store, must-revalidate\r\nPragma: no-cache\r\nConnection: close\r\n\r\n")
            .build();

        write_head(&mut writer, "200 OK", "video/mp4").await.unwrap();
    }

    #[tokio::test]
    async fn test_half_close_cancels_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let (read_half, _write_half) = server.into_split();
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_disconnect(read_half, cancel.clone()));

        // Stray bytes after the head are ignored
        client.write_all(b"keep-alive noise").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!cancel.is_cancelled());

        client.shutdown().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), watcher)
            .await
            .unwrap()
            .unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_unknown_camera_is_404() {
        let registry = Arc::new(CameraRegistry::new(crate::registry::StaticResolver::new()).unwrap());
        let server = RelayServer::new(ServerConfig::default(), Arc::clone(&registry));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        let task = tokio::spawn(async move {
            server
                .serve_until(listener, async move { stop.cancelled().await })
                .await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /camera/attic HTTP/1.1\r\nHost: relay\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));

        shutdown.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(registry.camera_count().await, 0);
    }
}
