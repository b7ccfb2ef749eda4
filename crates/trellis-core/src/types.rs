//! Common HTTP types used throughout the framework.
//!
//! Bodies are collected into memory before dispatch, so requests carry
//! plain [`Bytes`] and the wrapper helpers in [`crate::request`] can
//! read them in place. Responses use `Full<Bytes>` so they can be
//! handed to the connection layer as-is.

use bytes::Bytes;
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;

/// The HTTP request type used in the middleware chain and handlers.
pub type Request = http::Request<Bytes>;

/// The HTTP response type produced by handlers and middleware.
pub type Response = http::Response<Full<Bytes>>;

/// A boxed future, as returned by middleware and handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
