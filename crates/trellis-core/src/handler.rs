//! The terminal request handler trait.
//!
//! Any `Fn(Request) -> impl Future<Output = Response>` is a handler, so
//! routes are usually registered with plain async functions:
//!
//! ```
//! use trellis_core::{envelope, Request, Response};
//! use http::StatusCode;
//!
//! async fn list_users(_req: Request) -> Response {
//!     envelope::success(StatusCode::OK, serde_json::json!([]))
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::types::{BoxFuture, Request, Response};

/// A shareable, type-erased handler.
pub type BoxHandler = Arc<dyn Handler>;

/// A terminal request handler.
pub trait Handler: Send + Sync + 'static {
    /// Produces the response for a request.
    fn call(&self, request: Request) -> BoxFuture<'static, Response>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, Response> {
        Box::pin(self(request))
    }
}
