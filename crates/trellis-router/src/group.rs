//! Route groups: prefix + middleware accumulators.

use http::Method;
use std::sync::Arc;

use trellis_core::{BoxMiddleware, Handler, Middleware};

use crate::node::Route;
use crate::router::Router;

/// A registration scope that prefixes paths and accumulates middleware.
///
/// Groups nest: a child group starts from the parent's combined prefix
/// and a **copy** of the parent's middleware list, so middleware added
/// to the child never leaks back into the parent.
///
/// # Example
///
/// ```
/// use trellis_router::Router;
/// use trellis_core::{envelope, Request, Response};
/// use http::StatusCode;
///
/// async fn list_articles(_req: Request) -> Response {
///     envelope::success(StatusCode::OK, serde_json::json!([]))
/// }
///
/// let mut router = Router::new();
/// let mut api = router.group("/api");
/// let mut v1 = api.group("/v1");
/// v1.get("/articles", list_articles); // registered at /api/v1/articles
/// ```
pub struct RouteGroup<'r> {
    router: &'r mut Router,
    prefix: String,
    middleware: Vec<BoxMiddleware>,
}

impl<'r> RouteGroup<'r> {
    pub(crate) fn new(router: &'r mut Router, prefix: &str) -> Self {
        Self {
            router,
            prefix: prefix.to_string(),
            middleware: Vec::new(),
        }
    }

    /// Opens a nested group under this group's prefix.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            prefix: format!("{}{}", self.prefix, prefix),
            // Copy, not alias: later additions to either group must not
            // affect the other.
            middleware: self.middleware.clone(),
            router: &mut *self.router,
        }
    }

    /// Appends a middleware to this group.
    ///
    /// Applies to routes registered through this group *after* the
    /// call; routes already registered keep the snapshot they were
    /// registered with.
    pub fn middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Registers a `GET` route under the group prefix.
    pub fn get<H: Handler>(&mut self, path: &str, handler: H) -> &mut Route {
        self.handle(Method::GET, path, handler)
    }

    /// Registers a `POST` route under the group prefix.
    pub fn post<H: Handler>(&mut self, path: &str, handler: H) -> &mut Route {
        self.handle(Method::POST, path, handler)
    }

    /// Registers a `PUT` route under the group prefix.
    pub fn put<H: Handler>(&mut self, path: &str, handler: H) -> &mut Route {
        self.handle(Method::PUT, path, handler)
    }

    /// Registers a `PATCH` route under the group prefix.
    pub fn patch<H: Handler>(&mut self, path: &str, handler: H) -> &mut Route {
        self.handle(Method::PATCH, path, handler)
    }

    /// Registers a `DELETE` route under the group prefix.
    pub fn delete<H: Handler>(&mut self, path: &str, handler: H) -> &mut Route {
        self.handle(Method::DELETE, path, handler)
    }

    /// Registers a route under the group prefix with the group's
    /// current middleware snapshot.
    pub fn handle<H: Handler>(&mut self, method: Method, path: &str, handler: H) -> &mut Route {
        let full_path = format!("{}{}", self.prefix, path);
        self.router.handle_with(
            method,
            &full_path,
            Arc::new(handler),
            self.middleware.clone(),
        )
    }
}
