//! CORS middleware.
//!
//! Sets permissive cross-origin headers for a single configured origin
//! and short-circuits `OPTIONS` preflights with `204 No Content` and
//! the allowed-methods/headers set.

use bytes::Bytes;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::Full;

use trellis_core::{BoxFuture, Middleware, Next, Request, Response};

const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-CSRF-Token, X-Request-ID";
const MAX_AGE_SECS: &str = "86400";

/// Adds CORS headers for the configured origin.
///
/// # Example
///
/// ```
/// use trellis_middleware::Cors;
///
/// let cors = Cors::new("https://app.example.com");
/// let dev_cors = Cors::permissive(); // Access-Control-Allow-Origin: *
/// ```
#[derive(Debug, Clone)]
pub struct Cors {
    origin: String,
}

impl Cors {
    /// Creates a CORS middleware allowing the given origin.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }

    /// Allows any origin. Development use only.
    #[must_use]
    pub fn permissive() -> Self {
        Self::new("*")
    }

    fn apply_headers(&self, response: &mut Response) {
        let headers = response.headers_mut();
        if let Ok(origin) = HeaderValue::from_str(&self.origin) {
            headers.insert("access-control-allow-origin", origin);
        }
        headers.insert(
            "access-control-allow-methods",
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            "access-control-allow-headers",
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(
            "access-control-max-age",
            HeaderValue::from_static(MAX_AGE_SECS),
        );
    }
}

impl Middleware for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if request.method() == Method::OPTIONS {
                let mut response = http::Response::builder()
                    .status(StatusCode::NO_CONTENT)
                    .body(Full::new(Bytes::new()))
                    .expect("valid response");
                self.apply_headers(&mut response);
                return response;
            }

            let mut response = next.run(request).await;
            self.apply_headers(&mut response);
            response
        })
    }
}
