//! Request logging middleware.
//!
//! Assigns every request a v4 UUID, attaches it as a typed extension
//! and an `X-Request-ID` response header, and logs method, path,
//! status, and elapsed time once the response is known.

use http::HeaderValue;
use std::time::Instant;
use uuid::Uuid;

use trellis_core::{BoxFuture, Middleware, Next, Request, Response};

/// The request id assigned by [`RequestLog`], readable by handlers via
/// request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

/// Logs one line per request with its id, route, status, and latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLog;

impl RequestLog {
    /// Creates the logging middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for RequestLog {
    fn name(&self) -> &'static str {
        "request-log"
    }

    fn handle<'a>(&'a self, mut request: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let request_id = Uuid::new_v4();
            request.extensions_mut().insert(RequestId(request_id));

            let method = request.method().clone();
            let path = request.uri().path().to_string();
            let start = Instant::now();

            let mut response = next.run(request).await;

            tracing::info!(
                request_id = %request_id,
                %method,
                %path,
                status = response.status().as_u16(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "request completed"
            );

            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert("x-request-id", value);
            }
            response
        })
    }
}
