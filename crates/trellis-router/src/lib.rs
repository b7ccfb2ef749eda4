//! Trie-based request routing for Trellis.
//!
//! One trie per HTTP method maps path segments to handlers in time
//! bounded by the path length. Parameter segments are written `{name}`;
//! static segments always win over parameter segments. Routes carry the
//! middleware snapshot they were registered with, and dispatch composes
//! global, group, and per-route middleware around the handler.
//!
//! # Example
//!
//! ```
//! use trellis_router::Router;
//! use trellis_core::{envelope, Request, RequestExt, Response};
//! use http::StatusCode;
//!
//! async fn show_user(req: Request) -> Response {
//!     let id = req.route_param("id").unwrap_or_default().to_string();
//!     envelope::success(StatusCode::OK, serde_json::json!({ "id": id }))
//! }
//!
//! let mut router = Router::new();
//! router.get("/users/{id}", show_user);
//!
//! let api = router.group("/api");
//! // api.get("/posts", list_posts); ...
//! ```

mod group;
mod node;
mod router;

pub use group::RouteGroup;
pub use node::Route;
pub use router::Router;
