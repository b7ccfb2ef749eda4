//! Core building blocks for the Trellis framework.
//!
//! This crate holds everything the other Trellis crates agree on:
//!
//! - [`types`]: the request/response aliases used across the stack
//! - [`error`]: the standard error type with HTTP status mapping
//! - [`envelope`]: `{success, data, meta}` / `{success, error}` response builders
//! - [`request`]: helpers over the raw request (body parsing, route params,
//!   auth accessors, client IP extraction)
//! - [`middleware`]: the middleware trait and continuation chain
//! - [`handler`]: the terminal handler trait
//! - [`di`]: a type-keyed dependency injection container
//! - [`signal`]: a clonable stop signal for background tasks

pub mod di;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod request;
pub mod signal;
pub mod types;

pub use di::{Container, ContainerError};
pub use error::{Error, FieldErrors};
pub use handler::{BoxHandler, Handler};
pub use middleware::{BoxMiddleware, FnMiddleware, Middleware, Next};
pub use request::{AuthUser, ClientAddr, RequestExt, RouteParams};
pub use signal::StopSignal;
pub use types::{BoxFuture, Request, Response};
