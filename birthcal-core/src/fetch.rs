//! Remote vCard retrieval.

use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf, Take};
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use url::Url;

use crate::constants::{HTTP_TIMEOUT, MAX_RESPONSE_BYTES, USER_AGENT};
use crate::error::{BirthcalError, BirthcalResult};

/// Retrieves a vCard byte stream from a remote address book.
///
/// The returned reader may block on the network, so consume it off the async
/// runtime (e.g. inside `spawn_blocking`).
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        url: &str,
        username: &str,
        password: &str,
    ) -> BirthcalResult<Box<dyn Read + Send>>;
}

/// [`StreamFetcher`] over HTTP(S) with optional basic authentication.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new() -> BirthcalResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BirthcalError::Http(e.to_string()))?;

        Ok(HttpFetcher {
            client,
            max_bytes: MAX_RESPONSE_BYTES,
        })
    }

    /// Lower the download ceiling (the default is [`MAX_RESPONSE_BYTES`]).
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl StreamFetcher for HttpFetcher {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        url: &str,
        username: &str,
        password: &str,
    ) -> BirthcalResult<Box<dyn Read + Send>> {
        let parsed = validate_url(url)?;
        let safe_url = redacted_url(&parsed);

        tracing::debug!(component = "fetcher", url = %safe_url, "Initiating vCard download");

        let mut request = self.client.get(parsed);
        if !username.is_empty() || !password.is_empty() {
            request = request.basic_auth(username, Some(password));
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(BirthcalError::Cancelled),
            response = request.send() => response.map_err(|e| BirthcalError::Http(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                component = "fetcher",
                url = %safe_url,
                status_code = status.as_u16(),
                "Server returned error status"
            );
            return Err(BirthcalError::HttpStatus(status.as_u16()));
        }

        tracing::info!(
            component = "fetcher",
            url = %safe_url,
            content_length = response.content_length(),
            "vCards downloading"
        );

        let chunks: ChunkStream = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let body = BodyReader {
            inner: StreamReader::new(chunks).take(self.max_bytes as u64),
            limit: self.max_bytes,
            token: cancel.clone(),
            cancelled: Box::pin(cancel.clone().cancelled_owned()),
        };

        // The decoder pulls from a blocking thread while the body keeps streaming in
        Ok(Box::new(SyncIoBridge::new(body)))
    }
}

type ChunkStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Response body capped at the download ceiling that fails once the token fires.
struct BodyReader {
    inner: Take<StreamReader<ChunkStream, Bytes>>,
    limit: usize,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl AsyncRead for BodyReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.token.is_cancelled() || this.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(io::Error::other(BirthcalError::Cancelled)));
        }

        let at_limit = this.inner.limit() == 0;
        let before = buf.filled().len();
        let polled = Pin::new(&mut this.inner).poll_read(cx, buf);

        if !at_limit && this.inner.limit() == 0 && buf.filled().len() > before {
            tracing::warn!(
                component = "fetcher",
                limit_bytes = this.limit,
                "Response truncated at size limit"
            );
        }
        polled
    }
}

/// Accept only absolute http(s) URLs.
pub fn validate_url(url: &str) -> BirthcalResult<Url> {
    let parsed = Url::parse(url).map_err(|e| BirthcalError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(BirthcalError::UnsupportedScheme(other.to_string())),
    }
}

/// URL without credentials, query or fragment, safe for logs.
fn redacted_url(url: &Url) -> String {
    format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.path()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::FeedBuilder;
    use chrono::TimeZone;
    use std::time::{Duration, Instant};

    #[test]
    fn test_validate_url_schemes() {
        assert!(validate_url("https://dav.example.com/contacts.vcf").is_ok());
        assert!(validate_url("http://localhost:8080/book").is_ok());
        assert!(matches!(
            validate_url("ftp://example.com/contacts.vcf"),
            Err(BirthcalError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(BirthcalError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(BirthcalError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_redacted_url_drops_secrets() {
        let url = Url::parse("https://user:pw@dav.example.com/book.vcf?token=secret#x").unwrap();
        assert_eq!(redacted_url(&url), "https://dav.example.com/book.vcf");
    }

    #[tokio::test]
    async fn test_fetch_rejects_bad_scheme_before_network() {
        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher
            .fetch(&CancellationToken::new(), "ftp://example.com/a.vcf", "", "")
            .await;
        assert!(matches!(result, Err(BirthcalError::UnsupportedScheme(_))));
    }

    /// Drain a fetched body the way the decoder does, from a blocking thread.
    async fn read_body(reader: Box<dyn Read + Send>) -> io::Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || {
            let mut reader = reader;
            let mut body = Vec::new();
            reader.read_to_end(&mut body).map(|_| body)
        })
        .await
        .unwrap()
    }

    /// Accept one request, answer with chunked headers and `first`, then hold the
    /// connection open until `release` fires.
    async fn stalling_server(
        listener: tokio::net::TcpListener,
        first: &'static str,
        release: tokio::sync::oneshot::Receiver<()>,
    ) {
        use tokio::io::AsyncWriteExt;

        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let _ = socket.read(&mut buf).await.unwrap();
        let head = format!(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
            first.len(),
            first
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();

        let _ = release.await;
        let _ = socket.write_all(b"0\r\n\r\n").await;
    }

    const JANE: &str = "BEGIN:VCARD\r\nVERSION:3.0\r\nFN:Jane\r\nBDAY:1990-12-31\r\nEND:VCARD\r\n";

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_reads_body_with_basic_auth() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let body = "BEGIN:VCARD\r\nVERSION:3.0\r\nFN:Jane\r\nEND:VCARD\r\n";
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            request
        });

        let fetcher = HttpFetcher::new().unwrap();
        let reader = fetcher
            .fetch(
                &CancellationToken::new(),
                &format!("http://{addr}/contacts.vcf"),
                "jane",
                "secret",
            )
            .await
            .unwrap();
        let body = String::from_utf8(read_body(reader).await.unwrap()).unwrap();
        assert!(body.contains("FN:Jane"));

        let request = server.await.unwrap().to_lowercase();
        // base64("jane:secret")
        assert!(request.contains("authorization: basic amfuztpzzwnyzxq="), "{request}");
        assert!(request.contains("user-agent: birthcal/"), "{request}");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher
            .fetch(&CancellationToken::new(), &format!("http://{addr}/"), "", "")
            .await;
        assert!(matches!(result, Err(BirthcalError::HttpStatus(401))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_truncates_at_limit() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            let body = "x".repeat(100);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        let fetcher = HttpFetcher::new().unwrap().with_max_bytes(10);
        let reader = fetcher
            .fetch(&CancellationToken::new(), &format!("http://{addr}/"), "", "")
            .await
            .unwrap();
        assert_eq!(read_body(reader).await.unwrap().len(), 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_returns_before_body_completes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(stalling_server(listener, JANE, release_rx));

        let fetcher = HttpFetcher::new().unwrap();
        let reader = tokio::time::timeout(
            Duration::from_secs(2),
            fetcher.fetch(&CancellationToken::new(), &format!("http://{addr}/"), "", ""),
        )
        .await
        .expect("fetch waited for the whole body")
        .unwrap();

        release_tx.send(()).unwrap();
        let body = String::from_utf8(read_body(reader).await.unwrap()).unwrap();
        assert_eq!(body, JANE);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_while_server_stalls_before_response() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(Duration::from_secs(120)).await;
            drop(socket);
        });

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = HttpFetcher::new()
            .unwrap()
            .fetch(&cancel, &format!("http://{addr}/"), "", "")
            .await;
        assert!(matches!(result, Err(BirthcalError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_mid_body_aborts_decode() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_release_tx, release_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(stalling_server(listener, JANE, release_rx));

        let cancel = CancellationToken::new();
        let reader = HttpFetcher::new()
            .unwrap()
            .fetch(&cancel, &format!("http://{addr}/"), "", "")
            .await
            .unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let token = cancel.clone();
        let now = chrono::FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .unwrap();
        let result = tokio::task::spawn_blocking(move || FeedBuilder::new(now).build(reader, &token))
            .await
            .unwrap();

        assert!(matches!(result, Err(BirthcalError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_body_read_errors() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_release_tx, release_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(stalling_server(listener, JANE, release_rx));

        let cancel = CancellationToken::new();
        let reader = HttpFetcher::new()
            .unwrap()
            .fetch(&cancel, &format!("http://{addr}/"), "", "")
            .await
            .unwrap();
        cancel.cancel();

        let err = read_body(reader).await.unwrap_err();
        let cause = err.get_ref().and_then(|e| e.downcast_ref::<BirthcalError>());
        assert!(matches!(cause, Some(BirthcalError::Cancelled)), "{err}");
    }
}
