//! The middleware trait and continuation chain.
//!
//! A middleware receives the request and a [`Next`] continuation and
//! returns a response. It may short-circuit (return without calling
//! `next`), observe (call `next` and inspect the response), or enrich
//! the request before delegating. Chains are assembled by wrapping the
//! terminal handler in reverse registration order, so the first
//! registered middleware runs outermost.
//!
//! # Example
//!
//! ```
//! use trellis_core::{BoxFuture, Middleware, Next, Request, Response};
//!
//! struct HeaderStamp;
//!
//! impl Middleware for HeaderStamp {
//!     fn name(&self) -> &'static str {
//!         "header-stamp"
//!     }
//!
//!     fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             let mut response = next.run(request).await;
//!             response.headers_mut().insert("x-stamped", "1".parse().unwrap());
//!             response
//!         })
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::types::{BoxFuture, Request, Response};

/// A type-erased, shareable middleware.
pub type BoxMiddleware = Arc<dyn Middleware>;

/// A composable request/response wrapper.
///
/// # Invariants
///
/// - A middleware calls `next.run()` at most once; not calling it
///   short-circuits the chain with the middleware's own response.
/// - Middleware must not swallow responses from downstream.
pub trait Middleware: Send + Sync + 'static {
    /// The name of this middleware, used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request, delegating downstream via `next`.
    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, Response>;
}

/// The remaining chain: zero or more middleware ending in a handler.
///
/// Consumed by [`Next::run`], so it can only be invoked once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(Box<dyn FnOnce(Request) -> BoxFuture<'static, Response> + Send + 'a>),
}

impl<'a> Next<'a> {
    /// Prepends a middleware onto an existing chain.
    #[must_use]
    pub fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates the terminal link that invokes the handler.
    #[must_use]
    pub fn handler<F>(f: F) -> Self
    where
        F: FnOnce(Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next middleware or the terminal handler.
    pub async fn run(self, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.handle(request, *next).await,
            NextInner::Handler(handler) => handler(request).await,
        }
    }
}

/// A middleware defined by a function returning a boxed future.
///
/// # Example
///
/// ```
/// use trellis_core::{BoxFuture, FnMiddleware, Next, Request, Response};
///
/// fn time_request(request: Request, next: Next<'_>) -> BoxFuture<'_, Response> {
///     Box::pin(async move {
///         let start = std::time::Instant::now();
///         let response = next.run(request).await;
///         tracing::debug!(elapsed = ?start.elapsed(), "request finished");
///         response
///     })
/// }
///
/// let timing = FnMiddleware::new("timing", time_request);
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Creates a named function-based middleware.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(Request, Next<'a>) -> BoxFuture<'a, Response> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        (self.func)(request, next)
    }
}
