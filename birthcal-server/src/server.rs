//! Connection handling for the feed server.
//!
//! Each accepted socket is served by hyper with a header read timeout, closed
//! after [`SERVER_IDLE_TIMEOUT`] without traffic, and drained on shutdown.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::Router;
use birthcal_core::constants::{SERVER_IDLE_TIMEOUT, SERVER_READ_TIMEOUT, SHUTDOWN_GRACE};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-connection time limits.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// Time allowed for a complete request head.
    pub read: Duration,
    /// Time a connection may go without moving a byte.
    pub idle: Duration,
    /// How long open connections get to finish once shutdown starts.
    pub grace: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        ConnectionLimits {
            read: SERVER_READ_TIMEOUT,
            idle: SERVER_IDLE_TIMEOUT,
            grace: SHUTDOWN_GRACE,
        }
    }
}

/// Accept connections until `shutdown` fires, then drain them.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    limits: ConnectionLimits,
    shutdown: CancellationToken,
) {
    let mut builder = Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(limits.read);

    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(component = "server", error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            },
        };

        // Reap finished connection tasks
        while connections.try_join_next().is_some() {}

        let (stream, activity) = TrackedStream::new(stream);
        let service = TowerToHyperService::new(app.clone());
        let conn = builder
            .serve_connection(TokioIo::new(stream), service)
            .into_owned();
        let conn = graceful.watch(conn);

        connections.spawn(serve_connection(conn, activity, limits.idle, peer));
    }

    drop(listener);
    tracing::info!(
        component = "server",
        open_connections = connections.len(),
        "Shutting down server"
    );

    tokio::select! {
        _ = graceful.shutdown() => {}
        _ = tokio::time::sleep(limits.grace) => {
            tracing::warn!(
                component = "server",
                grace_secs = limits.grace.as_secs(),
                "Open connections did not finish in time, aborting"
            );
            connections.abort_all();
        }
    }
}

async fn serve_connection<F, E>(conn: F, activity: Activity, idle: Duration, peer: SocketAddr)
where
    F: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    tokio::select! {
        result = conn => {
            if let Err(e) = result {
                tracing::debug!(component = "server", %peer, error = %e, "Connection closed with error");
            }
        }
        _ = activity.idle_for(idle) => {
            tracing::debug!(component = "server", %peer, "Closing idle connection");
        }
    }
}

/// Last moment bytes moved on a connection, shared with its watchdog.
#[derive(Clone)]
struct Activity {
    origin: Instant,
    last_millis: Arc<AtomicU64>,
}

impl Activity {
    fn new() -> Self {
        Activity {
            origin: Instant::now(),
            last_millis: Arc::new(AtomicU64::new(0)),
        }
    }

    fn touch(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_millis.store(elapsed, Ordering::Relaxed);
    }

    fn last(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_millis.load(Ordering::Relaxed))
    }

    /// Resolves once nothing has been read or written for `limit`.
    async fn idle_for(&self, limit: Duration) {
        loop {
            let deadline = self.last() + limit;
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

/// TCP stream that records traffic in an [`Activity`].
struct TrackedStream {
    inner: TcpStream,
    activity: Activity,
}

impl TrackedStream {
    fn new(inner: TcpStream) -> (Self, Activity) {
        let activity = Activity::new();
        let stream = TrackedStream {
            inner,
            activity: activity.clone(),
        };
        (stream, activity)
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let polled = Pin::new(&mut this.inner).poll_read(cx, buf);
        if buf.filled().len() > before {
            this.activity.touch();
        }
        polled
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_write(cx, buf);
        if matches!(polled, Poll::Ready(Ok(n)) if n > 0) {
            this.activity.touch();
        }
        polled
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if matches!(polled, Poll::Ready(Ok(n)) if n > 0) {
            this.activity.touch();
        }
        polled
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use birthcal_core::FeedCache;
    use chrono::{TimeZone, Utc};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::routes::router;
    use crate::state::AppState;

    use super::*;

    const FEED: &[u8] = b"BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n";

    async fn start(limits: ConnectionLimits) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let cache = Arc::new(FeedCache::new());
        cache.update_at(FEED, Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap());
        let app = router(AppState::new(cache));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(listener, app, limits, shutdown.clone()));
        (addr, shutdown, server)
    }

    /// Read until the peer closes; a reset counts as closed too.
    async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
        let mut received = Vec::new();
        let _ = stream.read_to_end(&mut received).await;
        received
    }

    #[tokio::test]
    async fn test_unfinished_headers_are_cut_off() {
        let (addr, shutdown, _server) = start(ConnectionLimits {
            read: Duration::from_millis(200),
            idle: Duration::from_secs(30),
            grace: Duration::from_secs(1),
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").await.unwrap();

        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(5), read_until_closed(&mut stream))
            .await
            .expect("connection with a stalled request head stayed open");
        assert!(started.elapsed() < Duration::from_secs(5));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_idle_keep_alive_connection_is_closed() {
        let (addr, shutdown, _server) = start(ConnectionLimits {
            read: Duration::from_secs(30),
            idle: Duration::from_millis(300),
            grace: Duration::from_secs(1),
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /feed.ics HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), read_until_closed(&mut stream))
            .await
            .expect("idle keep-alive connection stayed open");
        let response = String::from_utf8_lossy(&received);
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains("BEGIN:VCALENDAR"), "{response}");
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_returns_after_draining() {
        let (addr, shutdown, server) = start(ConnectionLimits::default()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let received = read_until_closed(&mut stream).await;
        assert!(String::from_utf8_lossy(&received).starts_with("HTTP/1.1 200"));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stalled_client_does_not_block_shutdown_past_grace() {
        let (addr, shutdown, server) = start(ConnectionLimits {
            read: Duration::from_secs(30),
            idle: Duration::from_secs(30),
            grace: Duration::from_millis(200),
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("shutdown waited on a stalled client")
            .unwrap();
    }
}
