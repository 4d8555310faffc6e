//! The accept loop.
//!
//! Connections are served strictly one after another on the calling task:
//! read one request, dispatch it, write the response, close. Handlers
//! therefore see the shared state exclusively and never interleave.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, trace, warn};

use crate::error::{ConnectionError, ConnectionPhase, HttpError, HttpResult};
use crate::hooks::DispatchHook;
use crate::limits::RequestLimits;
use crate::parser::RequestParser;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::status::StatusCode;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Per-connection tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServeOptions {
    pub limits: RequestLimits,
    /// Block size for streamed file bodies.
    pub write_block_size: usize,
    /// How long a client may take to deliver a complete request.
    pub read_timeout: Duration,
    /// How long writing and closing the response may take.
    pub write_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            limits: RequestLimits::default(),
            write_block_size: 1024,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
        }
    }
}

/// Router, options and hooks bundled into a serving loop over state `S`.
pub struct HttpServer<S> {
    router: Router<S>,
    options: ServeOptions,
    hooks: Vec<Arc<dyn DispatchHook>>,
}

impl<S> HttpServer<S> {
    pub fn new(router: Router<S>, options: ServeOptions) -> Self {
        Self {
            router,
            options,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn DispatchHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn router(&self) -> &Router<S> {
        &self.router
    }

    pub fn options(&self) -> &ServeOptions {
        &self.options
    }

    /// Accept and serve connections until `shutdown` resolves.
    ///
    /// A connection in progress is finished before shutdown is observed.
    pub async fn serve(
        &self,
        listener: TcpListener,
        state: &mut S,
        shutdown: impl Future,
    ) -> HttpResult<()> {
        info!(addr = %listener.local_addr()?, "accepting connections");
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("shutdown requested, leaving accept loop");
                    return Ok(());
                }
            };

            trace!(%peer, phase = %ConnectionPhase::Accepted, "connection");
            if let Err(e) = self.serve_connection(stream, state).await {
                debug!(%peer, phase = %e.phase, error = %e.source, "connection dropped");
            }
        }
    }

    /// Serve exactly one request over `io`, then close it.
    ///
    /// Returns the status written, or `None` when the peer went away before
    /// sending a request.
    pub async fn serve_connection<IO>(
        &self,
        io: IO,
        state: &mut S,
    ) -> Result<Option<StatusCode>, ConnectionError>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let (read_half, mut write_half) = tokio::io::split(io);
        let mut reader = BufReader::new(read_half);
        let mut parser = RequestParser::new(self.options.limits.clone());

        let parsed = match tokio::time::timeout(self.options.read_timeout, parser.parse(&mut reader)).await {
            Ok(parsed) => parsed,
            Err(_) => Err(HttpError::Timeout),
        };
        let request = match parsed {
            Ok(Some(request)) => request,
            Ok(None) => {
                trace!(phase = %ConnectionPhase::Closed, "peer closed without a request");
                return Ok(None);
            }
            Err(e) => {
                let Some(status) = e.rejection_status() else {
                    return Err(ConnectionError::new(ConnectionPhase::Parsing, e));
                };
                debug!(state = ?parser.state(), error = %e, %status, "request rejected");
                self.write(Response::error(status, &e), &mut write_half).await?;
                return Ok(Some(status));
            }
        };
        drop(reader);

        let response = self.dispatch(state, &request).await;
        let status = response.status();
        drop(request);

        self.write(response, &mut write_half).await?;
        trace!(phase = %ConnectionPhase::Closed, %status, "connection");
        Ok(Some(status))
    }

    /// Run hooks and the router for one parsed request.
    pub async fn dispatch(&self, state: &mut S, request: &Request) -> Response {
        for hook in &self.hooks {
            hook.before(request).await;
        }
        let response = self.router.dispatch(state, request);
        for hook in &self.hooks {
            hook.after(request, response.status()).await;
        }
        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status().as_u16(),
            "request"
        );
        response
    }

    async fn write<W>(&self, response: Response, writer: &mut W) -> Result<(), ConnectionError>
    where
        W: AsyncWrite + Unpin,
    {
        let writing = |e| ConnectionError::new(ConnectionPhase::Writing, e);
        let send = async {
            response.write_to(writer, self.options.write_block_size).await?;
            writer.shutdown().await
        };
        match tokio::time::timeout(self.options.write_timeout, send).await {
            Ok(sent) => sent.map_err(|e| writing(HttpError::Io(e))),
            Err(_) => Err(writing(HttpError::Timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    const BIG_BODY: usize = 256 * 1024;

    fn counter_server() -> HttpServer<u32> {
        let router = Router::new()
            .get("/count", |n: &mut u32, _: &Request| {
                *n += 1;
                Response::text(n.to_string())
            })
            .post("/echo", |_: &mut u32, req: &Request| Response::text(String::from_utf8_lossy(&req.body)))
            .get("/big", |_: &mut u32, _: &Request| Response::text("x".repeat(BIG_BODY)));
        HttpServer::new(router, ServeOptions::default())
    }

    async fn exchange(server: &HttpServer<u32>, state: &mut u32, raw: &[u8]) -> (Option<StatusCode>, String) {
        let (mut client, server_io) = tokio::io::duplex(64 * 1024);
        client.write_all(raw).await.unwrap();
        let status = server.serve_connection(server_io, state).await.unwrap();
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        (status, out)
    }

    #[tokio::test]
    async fn one_request_per_connection() {
        let server = counter_server();
        let mut n = 0;
        let (status, out) = exchange(&server, &mut n, b"GET /count HTTP/1.1\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::OK));
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Connection: close\r\n"));
        assert!(out.ends_with("\r\n\r\n1"));
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn body_reaches_the_handler() {
        let server = counter_server();
        let (_, out) = exchange(
            &server,
            &mut 0,
            b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello",
        )
        .await;
        assert!(out.ends_with("hello"));
    }

    #[tokio::test]
    async fn oversize_request_gets_413() {
        let server = counter_server();
        let (status, out) = exchange(
            &server,
            &mut 0,
            b"POST /echo HTTP/1.1\r\nContent-Length: 9999999\r\n\r\n",
        )
        .await;
        assert_eq!(status, Some(StatusCode::PAYLOAD_TOO_LARGE));
        assert!(out.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let server = counter_server();
        let (status, _) = exchange(&server, &mut 0, b"NONSENSE\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn silent_peer_is_closed_quietly() {
        let server = counter_server();
        let (client, server_io) = tokio::io::duplex(1024);
        drop(client);
        let status = server.serve_connection(server_io, &mut 0).await.unwrap();
        assert_eq!(status, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_request_times_out() {
        let server = counter_server();
        let (mut client, server_io) = tokio::io::duplex(1024);
        client.write_all(b"GET /count HTTP/1.1\r\n").await.unwrap();
        let err = server.serve_connection(server_io, &mut 0).await.unwrap_err();
        assert_eq!(err.phase, ConnectionPhase::Parsing);
        assert!(matches!(err.source, HttpError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn reader_that_never_reads_times_out() {
        let server = counter_server();
        let (mut client, server_io) = tokio::io::duplex(1024);
        client.write_all(b"GET /big HTTP/1.1\r\n\r\n").await.unwrap();
        let err = server.serve_connection(server_io, &mut 0).await.unwrap_err();
        assert_eq!(err.phase, ConnectionPhase::Writing);
        assert!(matches!(err.source, HttpError::Timeout));
        drop(client);
    }

    #[derive(Default)]
    struct CountingHook {
        before: AtomicUsize,
        after: AtomicUsize,
    }

    #[async_trait]
    impl DispatchHook for CountingHook {
        async fn before(&self, _request: &Request) {
            self.before.fetch_add(1, Ordering::SeqCst);
        }

        async fn after(&self, _request: &Request, status: StatusCode) {
            assert_eq!(status, StatusCode::NOT_FOUND);
            self.after.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn hooks_wrap_dispatch() {
        let hook = Arc::new(CountingHook::default());
        let server = counter_server().with_hook(hook.clone());
        exchange(&server, &mut 0, b"GET /nowhere HTTP/1.1\r\n\r\n").await;
        assert_eq!(hook.before.load(Ordering::SeqCst), 1);
        assert_eq!(hook.after.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn serve_until_shutdown() {
        let server = counter_server();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let mut n = 0;

        let client = async move {
            for expected in 1..=3 {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                stream.write_all(b"GET /count HTTP/1.1\r\n\r\n").await.unwrap();
                let mut out = String::new();
                stream.read_to_string(&mut out).await.unwrap();
                assert!(out.ends_with(&expected.to_string()));
            }
            tx.send(()).unwrap();
        };

        let (served, ()) = tokio::join!(
            server.serve(listener, &mut n, async {
                rx.await.ok();
            }),
            client
        );
        served.unwrap();
        assert_eq!(n, 3);
    }

    #[tokio::test]
    async fn vanished_client_does_not_stop_the_loop() {
        let server = counter_server();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let mut n = 0;

        let clients = async move {
            let mut gone = TcpStream::connect(addr).await.unwrap();
            gone.write_all(b"GET /big HTTP/1.1\r\n\r\n").await.unwrap();
            drop(gone);

            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"GET /count HTTP/1.1\r\n\r\n").await.unwrap();
            let mut out = String::new();
            stream.read_to_string(&mut out).await.unwrap();
            assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
            assert!(out.ends_with("\r\n\r\n1"));
            tx.send(()).unwrap();
        };

        let (served, ()) = tokio::join!(
            server.serve(listener, &mut n, async {
                rx.await.ok();
            }),
            clients
        );
        served.unwrap();
        assert_eq!(n, 1);
    }
}
