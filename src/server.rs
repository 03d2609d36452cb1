//! TCP listener for echo sessions.
//!
//! Accepts connections on one address and hands each to the echo handler.
//! In serial mode a session runs to completion before the next accept;
//! in concurrent mode every session gets its own task, bounded by a
//! semaphore. A failing session never stops the accept loop.

use crate::config::{Config, SessionMode};
use crate::error::ServerError;
use crate::protocols::echo;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info};

/// Server instance
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    mode: SessionMode,
    session_limit: Arc<Semaphore>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Stops a running [`Server`] from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the accept loop to return. Idempotent.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

impl Server {
    /// Bind the configured address.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        let addr = resolve(&config.listen)?;
        let std_listener = create_listener(addr, config.backlog)
            .map_err(|source| ServerError::Bind { addr, source })?;
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Server {
            listener,
            local_addr,
            mode: config.mode,
            session_limit: Arc::new(Semaphore::new(config.max_sessions)),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    /// Address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that stops [`Server::run`] from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Accept connections until shutdown is requested.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(address = %self.local_addr, mode = ?self.mode, "Server listening");
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Wait for a session slot
            let permit = match self.mode {
                SessionMode::Concurrent => tokio::select! {
                    _ = shutdown.changed() => break,
                    permit = self.session_limit.clone().acquire_owned() => Some(permit?),
                },
                SessionMode::Serial => None,
            };

            let accepted = tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer, "New connection");

            match permit {
                None => serve_session(stream, peer).await,
                Some(permit) => {
                    tokio::spawn(async move {
                        serve_session(stream, peer).await;
                        drop(permit);
                    });
                }
            }
        }

        info!("Server shutting down");
        Ok(())
    }
}

/// Run one session and log how it ended.
async fn serve_session(stream: TcpStream, peer: SocketAddr) {
    match echo::handle_connection(stream).await {
        Ok(end) => debug!(peer = %peer, ?end, "Connection closed"),
        Err(e) => debug!(peer = %peer, error = %e, "Connection error"),
    }
}

fn resolve(listen: &str) -> Result<SocketAddr, ServerError> {
    listen
        .to_socket_addrs()
        .map_err(|source| ServerError::Resolve {
            addr: listen.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| ServerError::NoAddress(listen.to_string()))
}

/// Create a TCP listener with SO_REUSEADDR so the fixed port can be
/// re-bound while old sockets sit in TIME_WAIT.
fn create_listener(addr: SocketAddr, backlog: i32) -> std::io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DeflateCodec;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn test_config(mode: SessionMode) -> Config {
        Config {
            listen: "127.0.0.1:0".to_string(),
            mode,
            max_sessions: 4,
            backlog: 16,
            log_level: "info".to_string(),
        }
    }

    fn start(mode: SessionMode) -> (SocketAddr, ShutdownHandle, JoinHandle<Result<(), ServerError>>) {
        let server = Server::bind(&test_config(mode)).unwrap();
        let addr = server.local_addr();
        let handle = server.shutdown_handle();
        let task = tokio::spawn(async move { server.run().await });
        (addr, handle, task)
    }

    async fn exchange(stream: &mut TcpStream, request: &[u8], expected: &[u8]) {
        stream.write_all(request).await.unwrap();
        let mut reply = vec![0u8; expected.len()];
        timeout(TEST_TIMEOUT, stream.read_exact(&mut reply))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, expected);
    }

    /// True once the server has closed its side without sending anything.
    async fn closed_without_reply(stream: &mut TcpStream) -> bool {
        let mut buffer = [0u8; 64];
        match timeout(TEST_TIMEOUT, stream.read(&mut buffer)).await.unwrap() {
            Ok(n) => n == 0,
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_bind_reports_local_addr() {
        let server = Server::bind(&test_config(SessionMode::Serial)).unwrap();
        assert!(server.local_addr().ip().is_loopback());
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_invalid_address() {
        let mut config = test_config(SessionMode::Serial);
        config.listen = "not an address".to_string();
        assert!(matches!(
            Server::bind(&config),
            Err(ServerError::Resolve { .. })
        ));
    }

    #[tokio::test]
    async fn test_echo_scenarios() {
        let (addr, handle, task) = start(SessionMode::Serial);

        let mut client = TcpStream::connect(addr).await.unwrap();
        exchange(&mut client, b"plain words\r\n", b"plain words\r\n").await;
        exchange(&mut client, b"hello x world", b"hello ThisIsLong world").await;

        client.write_all(b"DISCONNECT now").await.unwrap();
        assert!(closed_without_reply(&mut client).await);

        handle.shutdown();
        tokio_test::assert_ok!(timeout(TEST_TIMEOUT, task).await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_compression_renegotiation() {
        let (addr, handle, task) = start(SessionMode::Serial);
        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut deflater = DeflateCodec::new();
        let mut inflater = DeflateCodec::new();

        exchange(&mut client, b"COMPRESSx", b"COMPRESSThisIsLong").await;

        client
            .write_all(&deflater.compress(b"deflated x").unwrap())
            .await
            .unwrap();

        let expected = b"deflated ThisIsLong";
        let mut decoded = Vec::new();
        let mut buffer = [0u8; 2048];
        while decoded.len() < expected.len() {
            let n = timeout(TEST_TIMEOUT, client.read(&mut buffer))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0, "server closed before full reply");
            decoded.extend(inflater.decompress(&buffer[..n]).unwrap());
        }
        assert_eq!(decoded, expected);

        // Plaintext is no longer accepted
        client.write_all(b"hello world").await.unwrap();
        assert!(closed_without_reply(&mut client).await);

        handle.shutdown();
        timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serial_accepts_next_after_close() {
        let (addr, handle, task) = start(SessionMode::Serial);

        let mut first = TcpStream::connect(addr).await.unwrap();
        exchange(&mut first, b"one", b"one").await;
        drop(first);

        // Sessions are independent: the new one starts in plaintext
        let mut second = TcpStream::connect(addr).await.unwrap();
        exchange(&mut second, b"two x", b"two ThisIsLong").await;

        handle.shutdown();
        drop(second);
        timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_session_keeps_listener_alive() {
        let (addr, handle, task) = start(SessionMode::Serial);

        let mut broken = TcpStream::connect(addr).await.unwrap();
        exchange(&mut broken, b"COMPRESS", b"COMPRESS").await;
        broken.write_all(b"not deflate").await.unwrap();
        assert!(closed_without_reply(&mut broken).await);

        let mut next = TcpStream::connect(addr).await.unwrap();
        exchange(&mut next, b"still up", b"still up").await;

        handle.shutdown();
        drop(next);
        timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_sessions_overlap() {
        let (addr, handle, task) = start(SessionMode::Concurrent);

        let mut first = TcpStream::connect(addr).await.unwrap();
        exchange(&mut first, b"first", b"first").await;

        // `first` is still open; a second session must be served anyway
        let mut second = TcpStream::connect(addr).await.unwrap();
        exchange(&mut second, b"second x", b"second ThisIsLong").await;
        exchange(&mut first, b"first again", b"first again").await;

        handle.shutdown();
        timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_run() {
        let server = Server::bind(&test_config(SessionMode::Serial)).unwrap();
        server.shutdown_handle().shutdown();
        timeout(TEST_TIMEOUT, server.run()).await.unwrap().unwrap();
    }
}
