//! The router: registration, grouping, and dispatch.

use http::{Method, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;

use trellis_core::{
    envelope, BoxHandler, BoxMiddleware, Handler, Middleware, Next, Request, Response, RouteParams,
};

use crate::group::RouteGroup;
use crate::node::{parse_path, Node, Route};

/// A method-partitioned trie router.
///
/// Routes are registered at startup and frozen afterwards; dispatch
/// never mutates the router, so it is shared across request tasks
/// without locking.
///
/// # Middleware ordering
///
/// Middleware registered on the router runs outermost, then the group
/// middleware captured at registration, then per-route middleware, then
/// the handler. Registration order is preserved within each tier.
///
/// # Example
///
/// ```
/// use trellis_router::Router;
/// use trellis_core::{envelope, Request, Response};
/// use http::StatusCode;
///
/// async fn health(_req: Request) -> Response {
///     envelope::success(StatusCode::OK, serde_json::json!({"status": "up"}))
/// }
///
/// let mut router = Router::new();
/// router.get("/health", health);
/// ```
pub struct Router {
    trees: HashMap<Method, Node>,
    global: Vec<BoxMiddleware>,
    not_found: BoxHandler,
}

async fn default_not_found(_req: Request) -> Response {
    envelope::error(StatusCode::NOT_FOUND, "route not found")
}

impl Router {
    /// Creates an empty router with the default not-found handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trees: HashMap::new(),
            global: Vec::new(),
            not_found: Arc::new(default_not_found),
        }
    }

    /// Appends a global middleware.
    ///
    /// Global middleware wraps every dispatched request, including the
    /// not-found path. Register panic recovery first so it sits
    /// outermost.
    pub fn middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.global.push(Arc::new(middleware));
        self
    }

    /// Replaces the not-found handler.
    pub fn not_found<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.not_found = Arc::new(handler);
        self
    }

    /// Registers a `GET` route.
    pub fn get<H: Handler>(&mut self, path: &str, handler: H) -> &mut Route {
        self.handle(Method::GET, path, handler)
    }

    /// Registers a `POST` route.
    pub fn post<H: Handler>(&mut self, path: &str, handler: H) -> &mut Route {
        self.handle(Method::POST, path, handler)
    }

    /// Registers a `PUT` route.
    pub fn put<H: Handler>(&mut self, path: &str, handler: H) -> &mut Route {
        self.handle(Method::PUT, path, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch<H: Handler>(&mut self, path: &str, handler: H) -> &mut Route {
        self.handle(Method::PATCH, path, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete<H: Handler>(&mut self, path: &str, handler: H) -> &mut Route {
        self.handle(Method::DELETE, path, handler)
    }

    /// Registers a route for an arbitrary method.
    ///
    /// Returns the installed [`Route`] so per-route middleware can be
    /// chained onto the registration.
    pub fn handle<H: Handler>(&mut self, method: Method, path: &str, handler: H) -> &mut Route {
        self.handle_with(method, path, Arc::new(handler), Vec::new())
    }

    /// Registers a route carrying a group middleware snapshot.
    pub(crate) fn handle_with(
        &mut self,
        method: Method,
        path: &str,
        handler: BoxHandler,
        middleware: Vec<BoxMiddleware>,
    ) -> &mut Route {
        let segments = parse_path(path);
        let tree = self.trees.entry(method).or_insert_with(Node::root);
        tree.insert(&segments, Route::new(handler, middleware))
    }

    /// Opens a route group with the given prefix.
    ///
    /// The group inherits no middleware from the router (global
    /// middleware already wraps everything) and starts with an empty
    /// group stack.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup::new(self, prefix)
    }

    /// Dispatches a request to the matching handler through its
    /// composed middleware chain.
    ///
    /// Unknown methods, unmatched paths, and terminal nodes without a
    /// handler all run the not-found handler. Captured path parameters
    /// are attached to the request only when at least one was bound.
    pub async fn dispatch(&self, mut request: Request) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let matched = self.trees.get(&method).and_then(|tree| {
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            let mut params = RouteParams::new();
            tree.find(&segments, &mut params).map(|route| (route, params))
        });

        match matched {
            Some((route, params)) => {
                if !params.is_empty() {
                    request.extensions_mut().insert(params);
                }
                let handler = route.handler.clone();
                let mut next = Next::handler(move |req| handler.call(req));
                for middleware in route.middleware.iter().rev() {
                    next = Next::new(middleware.as_ref(), next);
                }
                for middleware in self.global.iter().rev() {
                    next = Next::new(middleware.as_ref(), next);
                }
                next.run(request).await
            }
            None => {
                tracing::debug!(%method, %path, "no route matched");
                let handler = self.not_found.clone();
                let mut next = Next::handler(move |req| handler.call(req));
                for middleware in self.global.iter().rev() {
                    next = Next::new(middleware.as_ref(), next);
                }
                next.run(request).await
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;
    use std::sync::Mutex;
    use trellis_core::{BoxFuture, RequestExt};

    fn request(method: Method, path: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap()
    }

    fn text(status: StatusCode, body: &str) -> Response {
        http::Response::builder()
            .status(status)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    struct Tracer {
        name: &'static str,
        order: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Tracer {
        fn name(&self) -> &'static str {
            self.name
        }

        fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                self.order.lock().unwrap().push(format!("enter:{}", self.name));
                let response = next.run(request).await;
                self.order.lock().unwrap().push(format!("leave:{}", self.name));
                response
            })
        }
    }

    #[tokio::test]
    async fn test_dispatch_static_route() {
        let mut router = Router::new();
        router.get("/users", |_req: Request| async {
            text(StatusCode::OK, "list")
        });

        let response = router.dispatch(request(Method::GET, "/users")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dispatch_binds_route_params() {
        let mut router = Router::new();
        router.get("/users/{id}", |req: Request| async move {
            let id = req.route_param("id").unwrap_or("none").to_string();
            text(StatusCode::OK, &id)
        });

        let response = router.dispatch(request(Method::GET, "/users/42")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_path_is_404() {
        let mut router = Router::new();
        router.get("/users", |_req: Request| async {
            text(StatusCode::OK, "list")
        });

        let response = router.dispatch(request(Method::GET, "/posts")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method_is_404() {
        let mut router = Router::new();
        router.get("/users", |_req: Request| async {
            text(StatusCode::OK, "list")
        });

        let response = router.dispatch(request(Method::POST, "/users")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_custom_not_found_handler() {
        let mut router = Router::new();
        router.not_found(|_req: Request| async { text(StatusCode::NOT_FOUND, "custom") });

        let response = router.dispatch(request(Method::GET, "/anything")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_route_wins_over_param() {
        let mut router = Router::new();
        router.get("/users/{id}", |req: Request| async move {
            assert!(req.route_param("id").is_some());
            text(StatusCode::OK, "param")
        });
        router.get("/users/me", |req: Request| async move {
            assert!(req.route_param("id").is_none());
            text(StatusCode::ACCEPTED, "static")
        });

        let response = router.dispatch(request(Method::GET, "/users/me")).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = router.dispatch(request(Method::GET, "/users/7")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dispatch_is_deterministic() {
        let mut router = Router::new();
        router.get("/a/{x}/c", |_req: Request| async {
            text(StatusCode::OK, "h")
        });

        for _ in 0..3 {
            let response = router.dispatch(request(Method::GET, "/a/b/c")).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_middleware_ordering_global_group_route() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut router = Router::new();
        router.middleware(Tracer {
            name: "g1",
            order: order.clone(),
        });
        router.middleware(Tracer {
            name: "g2",
            order: order.clone(),
        });

        let observed = order.clone();
        {
            let mut api = router.group("/api");
            api.middleware(Tracer {
                name: "r1",
                order: order.clone(),
            });
            api.get("/ping", move |_req: Request| {
                let observed = observed.clone();
                async move {
                    observed.lock().unwrap().push("handler".to_string());
                    text(StatusCode::OK, "pong")
                }
            })
            .middleware(Tracer {
                name: "p1",
                order: order.clone(),
            });
        }

        let response = router.dispatch(request(Method::GET, "/api/ping")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let recorded = order.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec![
                "enter:g1", "enter:g2", "enter:r1", "enter:p1", "handler", "leave:p1", "leave:r1",
                "leave:g2", "leave:g1",
            ]
        );
    }

    #[tokio::test]
    async fn test_global_middleware_wraps_not_found() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut router = Router::new();
        router.middleware(Tracer {
            name: "g1",
            order: order.clone(),
        });

        let response = router.dispatch(request(Method::GET, "/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            order.lock().unwrap().clone(),
            vec!["enter:g1", "leave:g1"]
        );
    }

    #[tokio::test]
    async fn test_trailing_slash_matches() {
        let mut router = Router::new();
        router.get("/users", |_req: Request| async {
            text(StatusCode::OK, "list")
        });

        let response = router.dispatch(request(Method::GET, "/users/")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_root_path() {
        let mut router = Router::new();
        router.get("/", |_req: Request| async { text(StatusCode::OK, "home") });

        let response = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
