//! The HTTP server: accept loop and per-connection service.
//!
//! Each connection is served by hyper's HTTP/1 connection driver on
//! its own task, holding a [`ConnectionToken`] so shutdown can wait
//! for in-flight work. Request bodies are collected up front; the
//! transport peer address rides into dispatch as a typed extension so
//! the request helpers can fall back to it for the client IP.
//!
//! [`ConnectionToken`]: crate::shutdown::ConnectionToken

use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use trellis_core::{envelope, ClientAddr, Response, StopSignal};
use trellis_router::Router;

use crate::config::ServerConfig;
use crate::shutdown::ConnectionTracker;

/// Errors that stop the server from running.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Binding or accepting on the listener failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The HTTP server.
///
/// # Example
///
/// ```no_run
/// use trellis_router::Router;
/// use trellis_server::{Server, ServerConfig};
///
/// # async fn run() -> Result<(), trellis_server::ServerError> {
/// let router = Router::new();
/// let server = Server::new(router, ServerConfig::default());
///
/// // Trigger from the shutdown path:
/// let stop = server.stop_signal();
/// # let _ = stop;
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    router: Arc<Router>,
    config: ServerConfig,
    shutdown: StopSignal,
    tracker: ConnectionTracker,
}

impl Server {
    /// Creates a server around a finished router.
    #[must_use]
    pub fn new(router: Router, config: ServerConfig) -> Self {
        Self {
            router: Arc::new(router),
            config,
            shutdown: StopSignal::new(),
            tracker: ConnectionTracker::new(),
        }
    }

    /// The signal that stops the accept loop.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.shutdown.clone()
    }

    /// The tracker counting in-flight connections.
    #[must_use]
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Binds the listener and serves until the stop signal fires.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.addr()).await?;
        tracing::info!(addr = self.config.addr(), "server listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(error) => {
                            tracing::warn!(%error, "failed to accept connection");
                            continue;
                        }
                    };

                    let router = Arc::clone(&self.router);
                    let shutdown = self.shutdown.clone();
                    let timeout = self.config.request_timeout();
                    let token = self.tracker.acquire();

                    tokio::spawn(async move {
                        let _token = token;
                        if let Err(error) =
                            serve_connection(router, stream, remote_addr, shutdown, timeout).await
                        {
                            tracing::debug!(%error, %remote_addr, "connection ended with error");
                        }
                    });
                }
                () = self.shutdown.stopped() => break,
            }
        }

        tracing::info!("server stopped accepting connections");
        Ok(())
    }
}

async fn serve_connection(
    router: Arc<Router>,
    stream: tokio::net::TcpStream,
    remote_addr: SocketAddr,
    shutdown: StopSignal,
    timeout: std::time::Duration,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |request: http::Request<Incoming>| {
        let router = Arc::clone(&router);
        async move {
            Ok::<_, Infallible>(handle_request(router, request, remote_addr, timeout).await)
        }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::select! {
        result = conn => result,
        () = shutdown.stopped() => {
            tracing::debug!(%remote_addr, "connection closed for shutdown");
            Ok(())
        }
    }
}

async fn handle_request(
    router: Arc<Router>,
    request: http::Request<Incoming>,
    remote_addr: SocketAddr,
    timeout: std::time::Duration,
) -> Response {
    let (parts, body) = request.into_parts();

    let collected = match tokio::time::timeout(timeout, body.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(error)) => {
            tracing::warn!(%error, "failed to read request body");
            return envelope::error(StatusCode::BAD_REQUEST, "failed to read request body");
        }
        Err(_) => {
            return envelope::error(StatusCode::GATEWAY_TIMEOUT, "request body read timed out");
        }
    };

    let mut request = http::Request::from_parts(parts, collected);
    request.extensions_mut().insert(ClientAddr(remote_addr));

    match tokio::time::timeout(timeout, router.dispatch(request)).await {
        Ok(response) => response,
        Err(_) => envelope::error(StatusCode::GATEWAY_TIMEOUT, "request handling timed out"),
    }
}
