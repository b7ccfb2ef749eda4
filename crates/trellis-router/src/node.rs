//! Trie node implementation.
//!
//! Each node owns its static children in a vector kept sorted by
//! segment so lookup is a binary search, plus at most one parameter
//! child. A node carries a [`Route`] iff a registered path ends there.

use std::sync::Arc;

use trellis_core::{BoxHandler, BoxMiddleware, Middleware, RouteParams};

/// A registered route: the terminal handler plus the middleware
/// captured at registration (group snapshot, extended by fluent
/// per-route additions).
pub struct Route {
    pub(crate) handler: BoxHandler,
    pub(crate) middleware: Vec<BoxMiddleware>,
}

impl Route {
    pub(crate) fn new(handler: BoxHandler, middleware: Vec<BoxMiddleware>) -> Self {
        Self {
            handler,
            middleware,
        }
    }

    /// Appends a middleware to this route only.
    ///
    /// Per-route middleware runs innermost: after global and group
    /// middleware, immediately around the handler.
    pub fn middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }
}

/// A path segment parsed from a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Static(String),
    Param(String),
}

/// Splits a path pattern into segments, discarding empty ones.
///
/// # Panics
///
/// Panics on a parameter segment with an empty name (`{}`): route
/// patterns come from trusted startup code, so this is a programmer
/// error.
pub(crate) fn parse_path(path: &str) -> Vec<Segment> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                assert!(
                    !name.is_empty(),
                    "route parameter name must not be empty in {path:?}"
                );
                Segment::Param(name.to_string())
            } else {
                Segment::Static(s.to_string())
            }
        })
        .collect()
}

/// A node in a method's routing trie.
pub(crate) struct Node {
    segment: String,
    /// Parameter name when this is a parameter node.
    param_name: Option<String>,
    route: Option<Route>,
    /// Static children, sorted by segment for binary search.
    static_children: Vec<Node>,
    /// At most one parameter child per node.
    param_child: Option<Box<Node>>,
}

impl Node {
    pub(crate) fn root() -> Self {
        Self::new_static("")
    }

    fn new_static(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            param_name: None,
            route: None,
            static_children: Vec::new(),
            param_child: None,
        }
    }

    fn new_param(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            segment: format!("{{{name}}}"),
            param_name: Some(name),
            route: None,
            static_children: Vec::new(),
            param_child: None,
        }
    }

    /// Installs a route at the node addressed by `segments`, creating
    /// intermediate nodes as needed. Returns the installed route so
    /// registration can be extended fluently.
    pub(crate) fn insert(&mut self, segments: &[Segment], route: Route) -> &mut Route {
        match segments.split_first() {
            None => {
                self.route = Some(route);
                self.route.as_mut().expect("route was just installed")
            }
            Some((segment, rest)) => match segment {
                Segment::Static(name) => {
                    let index = match self
                        .static_children
                        .binary_search_by(|c| c.segment.as_str().cmp(name))
                    {
                        Ok(index) => index,
                        Err(index) => {
                            self.static_children.insert(index, Node::new_static(name));
                            index
                        }
                    };
                    self.static_children[index].insert(rest, route)
                }
                Segment::Param(name) => {
                    if self.param_child.is_none() {
                        self.param_child = Some(Box::new(Node::new_param(name.clone())));
                    }
                    self.param_child
                        .as_mut()
                        .expect("param child was just created")
                        .insert(rest, route)
                }
            },
        }
    }

    /// Walks the trie for a request path.
    ///
    /// At every step a static child wins over the parameter child; a
    /// traversed parameter child binds the bracket-stripped name to the
    /// segment. Returns the route at the terminal node, if any.
    pub(crate) fn find(&self, segments: &[&str], params: &mut RouteParams) -> Option<&Route> {
        let mut node = self;
        for segment in segments {
            if let Some(child) = node.find_static(segment) {
                node = child;
            } else if let Some(child) = &node.param_child {
                if let Some(name) = &child.param_name {
                    params.push(name.clone(), *segment);
                }
                node = child;
            } else {
                return None;
            }
        }
        node.route.as_ref()
    }

    fn find_static(&self, segment: &str) -> Option<&Node> {
        self.static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
            .ok()
            .map(|index| &self.static_children[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;
    use trellis_core::{Request, Response};

    async fn noop_handler(_req: Request) -> Response {
        http::Response::builder()
            .status(http::StatusCode::OK)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn noop_route() -> Route {
        Route::new(Arc::new(noop_handler), Vec::new())
    }

    #[test]
    fn test_parse_path_static_and_param() {
        let segments = parse_path("/users/{id}/posts");
        assert_eq!(
            segments,
            vec![
                Segment::Static("users".to_string()),
                Segment::Param("id".to_string()),
                Segment::Static("posts".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_path_discards_empty_segments() {
        assert_eq!(parse_path("/"), Vec::new());
        assert_eq!(
            parse_path("//users//"),
            vec![Segment::Static("users".to_string())]
        );
    }

    #[test]
    #[should_panic(expected = "route parameter name must not be empty")]
    fn test_parse_path_rejects_empty_param_name() {
        parse_path("/users/{}");
    }

    #[test]
    fn test_insert_and_find_static() {
        let mut root = Node::root();
        root.insert(&parse_path("/users"), noop_route());

        let mut params = RouteParams::new();
        assert!(root.find(&["users"], &mut params).is_some());
        assert!(params.is_empty());
        assert!(root.find(&["posts"], &mut params).is_none());
    }

    #[test]
    fn test_insert_and_find_param_binds_value() {
        let mut root = Node::root();
        root.insert(&parse_path("/users/{id}"), noop_route());

        let mut params = RouteParams::new();
        assert!(root.find(&["users", "42"], &mut params).is_some());
        assert_eq!(params.get("id"), Some("42"));
    }

    #[test]
    fn test_static_wins_over_param() {
        let mut root = Node::root();
        root.insert(&parse_path("/users/{id}"), noop_route());
        root.insert(&parse_path("/users/me"), noop_route());

        // Static traversal binds nothing
        let mut params = RouteParams::new();
        assert!(root.find(&["users", "me"], &mut params).is_some());
        assert!(params.is_empty());

        let mut params = RouteParams::new();
        assert!(root.find(&["users", "99"], &mut params).is_some());
        assert_eq!(params.get("id"), Some("99"));
    }

    #[test]
    fn test_terminal_without_route_is_miss() {
        let mut root = Node::root();
        root.insert(&parse_path("/api/users"), noop_route());

        let mut params = RouteParams::new();
        assert!(root.find(&["api"], &mut params).is_none());
    }

    #[test]
    fn test_multiple_params() {
        let mut root = Node::root();
        root.insert(&parse_path("/orgs/{org}/users/{user}"), noop_route());

        let mut params = RouteParams::new();
        assert!(root
            .find(&["orgs", "acme", "users", "42"], &mut params)
            .is_some());
        assert_eq!(params.get("org"), Some("acme"));
        assert_eq!(params.get("user"), Some("42"));
    }

    #[test]
    fn test_root_route() {
        let mut root = Node::root();
        root.insert(&parse_path("/"), noop_route());

        let mut params = RouteParams::new();
        assert!(root.find(&[], &mut params).is_some());
    }

    #[test]
    fn test_static_children_stay_sorted() {
        let mut root = Node::root();
        root.insert(&parse_path("/zebra"), noop_route());
        root.insert(&parse_path("/alpha"), noop_route());
        root.insert(&parse_path("/mango"), noop_route());

        let mut params = RouteParams::new();
        assert!(root.find(&["alpha"], &mut params).is_some());
        assert!(root.find(&["mango"], &mut params).is_some());
        assert!(root.find(&["zebra"], &mut params).is_some());
    }
}
