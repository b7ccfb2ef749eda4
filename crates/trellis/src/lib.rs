//! # Trellis
//!
//! An HTTP service framework core:
//!
//! - **Trie routing** – method-partitioned path tries with `{param}`
//!   capture, route groups, and deterministic static-over-param matching
//! - **Middleware chain** – continuation-style wrappers composed
//!   global → group → per-route around the handler
//! - **Safe queries** – a fluent builder compiled by a dialect grammar;
//!   caller values only ever reach SQL as bound placeholders
//! - **Record scanning** – `#[derive(Record)]` types populated from
//!   rows via cached field maps with a stoppable idle reaper
//! - **Protection primitives** – token-bucket rate limiting and
//!   session-bound CSRF tokens, both with bounded memory
//! - **Coordinated shutdown** – every background reaper is stoppable
//!   and the teardown runs them down in a strict order
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use trellis::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.middleware(Recovery::new());
//!     router.middleware(RequestLog::new());
//!     router.get("/users/{id}", show_user);
//!
//!     let server = Server::new(router, ServerConfig::default());
//!     server.run().await?;
//!     Ok(())
//! }
//!
//! async fn show_user(req: Request) -> Response {
//!     let id = req.route_param("id").unwrap_or_default();
//!     envelope::success(http::StatusCode::OK, serde_json::json!({ "id": id }))
//! }
//! ```

#![forbid(unsafe_code)]

pub use trellis_core as core;

pub use trellis_router as router;

pub use trellis_middleware as middleware;

pub use trellis_db as db;

pub use trellis_cache as cache;

pub use trellis_server as server;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    pub use trellis_core::{
        envelope, Container, Error, Handler, Middleware, Next, Request, RequestExt, Response,
        RouteParams, StopSignal,
    };

    pub use trellis_router::{RouteGroup, Router};

    pub use trellis_middleware::{
        Cors, Csrf, CsrfStore, LimiterRegistry, RateLimit, RateLimiter, Recovery, RequestLog,
    };

    pub use trellis_db::{Database, DbError, MySqlGrammar, Record, ScannerCache, Value};

    pub use trellis_server::{AppConfig, Server, ServerConfig, Teardown};
}
