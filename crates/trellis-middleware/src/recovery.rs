//! Panic recovery middleware.
//!
//! Programmer errors inside the framework (invalid SQL identifiers,
//! unresolvable scan targets, empty route parameter names) abort the
//! request by panicking. This middleware is the boundary that turns
//! those aborts into a 500 error envelope while logging the panic with
//! a backtrace. Register it **first** on the router so it wraps every
//! other middleware and the handler.

use futures_util::FutureExt;
use http::StatusCode;
use std::any::Any;
use std::panic::AssertUnwindSafe;

use trellis_core::{envelope, BoxFuture, Middleware, Next, Request, Response};

/// Catches panics from downstream middleware and handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recovery;

impl Recovery {
    /// Creates the recovery middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Middleware for Recovery {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_string();

            match AssertUnwindSafe(next.run(request)).catch_unwind().await {
                Ok(response) => response,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    let backtrace = std::backtrace::Backtrace::force_capture();
                    tracing::error!(
                        %method,
                        %path,
                        panic = %message,
                        %backtrace,
                        "recovered from panic in request handler"
                    );
                    envelope::error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;

    fn test_request() -> Request {
        http::Request::builder()
            .uri("/test")
            .body(Bytes::new())
            .unwrap()
    }

    fn panicking_next() -> Next<'static> {
        Next::handler(|_req| {
            Box::pin(async {
                panic!("invalid SQL identifier: users; DROP TABLE users--");
            })
        })
    }

    #[tokio::test]
    async fn test_panic_becomes_500() {
        let recovery = Recovery::new();
        let response = recovery.handle(test_request(), panicking_next()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_healthy_responses_pass_through() {
        let recovery = Recovery::new();
        let next = Next::handler(|_req| {
            Box::pin(async {
                http::Response::builder()
                    .status(StatusCode::CREATED)
                    .body(Full::new(Bytes::from("made")))
                    .unwrap()
            })
        });

        let response = recovery.handle(test_request(), next).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("str payload");
        assert_eq!(panic_message(boxed.as_ref()), "str payload");

        let boxed: Box<dyn Any + Send> = Box::new("owned".to_string());
        assert_eq!(panic_message(boxed.as_ref()), "owned");

        let boxed: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
