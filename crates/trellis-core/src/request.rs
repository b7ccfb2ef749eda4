//! Helpers over the raw HTTP request.
//!
//! Request-scoped values ride in [`http::Extensions`], keyed by their
//! type: the router inserts [`RouteParams`] when a route captures path
//! parameters, the server inserts [`ClientAddr`] for the transport
//! address, and the authentication middleware (an external collaborator
//! to this crate) inserts [`AuthUser`]. The [`RequestExt`] trait reads
//! them back, alongside the body/header conveniences every handler
//! wants.
//!
//! # Example
//!
//! ```
//! use trellis_core::{Request, RequestExt, RouteParams};
//! use bytes::Bytes;
//!
//! let mut params = RouteParams::new();
//! params.push("id", "42");
//!
//! let mut req = http::Request::builder()
//!     .uri("/users/42?page=2")
//!     .body(Bytes::new())
//!     .unwrap();
//! req.extensions_mut().insert(params);
//!
//! assert_eq!(req.route_param("id"), Some("42"));
//! assert_eq!(req.query_param("page", "1"), "2");
//! assert_eq!(req.query_param("sort", "name"), "name");
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;

use crate::error::Error;

/// Maximum accepted size for a JSON request body: 10 MiB.
pub const MAX_JSON_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Path parameters captured by the router during dispatch.
///
/// Routes rarely carry more than a handful of parameters, so lookups
/// scan a small vector instead of hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    params: Vec<(String, String)>,
}

impl RouteParams {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a captured parameter.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.push((name.into(), value.into()));
    }

    /// Returns the value of a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the number of captured parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if no parameters were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterates over `(name, value)` pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// The authenticated caller, attached by the authentication middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Stable subject identifier.
    pub id: String,
    /// Email address of the caller.
    pub email: String,
    /// Role assigned to the caller.
    pub role: String,
}

/// The transport-level peer address, attached by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// Convenience accessors over [`crate::Request`].
pub trait RequestExt {
    /// Returns `true` if the `Content-Type` header indicates JSON.
    fn is_json(&self) -> bool;

    /// Extracts the bearer credential from the `Authorization` header.
    fn bearer_token(&self) -> Option<&str>;

    /// Reads a query-string parameter, falling back to `default`.
    fn query_param(&self, key: &str, default: &str) -> String;

    /// Reads a path parameter captured by the router.
    fn route_param(&self, key: &str) -> Option<&str>;

    /// Deserializes the JSON body into `T`.
    ///
    /// # Errors
    ///
    /// Returns a bad-request error when the body exceeds
    /// [`MAX_JSON_BODY_BYTES`] or is not valid JSON for `T`.
    fn parse_json<T: DeserializeOwned>(&self) -> Result<T, Error>;

    /// Resolves the client IP: first `X-Forwarded-For` entry, then
    /// `X-Real-IP`, then the transport address without its port.
    fn client_ip(&self) -> Option<String>;

    /// Returns the `User-Agent` header, if present.
    fn user_agent(&self) -> Option<&str>;

    /// Returns `true` if the `Accept` header admits `content_type`.
    fn accepts(&self, content_type: &str) -> bool;

    /// Returns the authenticated caller, if one was attached.
    fn auth_user(&self) -> Option<&AuthUser>;

    /// Returns the authenticated caller's id.
    fn auth_user_id(&self) -> Option<&str>;

    /// Returns the authenticated caller's email.
    fn auth_user_email(&self) -> Option<&str>;

    /// Returns the authenticated caller's role.
    fn auth_user_role(&self) -> Option<&str>;
}

impl RequestExt for http::Request<Bytes> {
    fn is_json(&self) -> bool {
        self.headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"))
    }

    fn bearer_token(&self) -> Option<&str> {
        let header = self
            .headers()
            .get(http::header::AUTHORIZATION)?
            .to_str()
            .ok()?;
        let mut parts = header.split_whitespace();
        let scheme = parts.next()?;
        let token = parts.next()?;
        if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        Some(token)
    }

    fn query_param(&self, key: &str, default: &str) -> String {
        let Some(query) = self.uri().query() else {
            return default.to_string();
        };
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(query).unwrap_or_default();
        pairs
            .into_iter()
            .find(|(k, _)| k == key)
            .map_or_else(|| default.to_string(), |(_, v)| v)
    }

    fn route_param(&self, key: &str) -> Option<&str> {
        self.extensions().get::<RouteParams>()?.get(key)
    }

    fn parse_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let body = self.body();
        if body.len() > MAX_JSON_BODY_BYTES {
            return Err(Error::bad_request("request body exceeds 10 MiB"));
        }
        serde_json::from_slice(body)
            .map_err(|e| Error::bad_request(format!("malformed JSON body: {e}")))
    }

    fn client_ip(&self) -> Option<String> {
        if let Some(forwarded) = self
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Some(first.to_string());
                }
            }
        }
        if let Some(real_ip) = self
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
        {
            return Some(real_ip.to_string());
        }
        self.extensions()
            .get::<ClientAddr>()
            .map(|addr| addr.0.ip().to_string())
    }

    fn user_agent(&self) -> Option<&str> {
        self.headers()
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
    }

    fn accepts(&self, content_type: &str) -> bool {
        self.headers()
            .get(http::header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains(content_type) || accept.contains("*/*"))
    }

    fn auth_user(&self) -> Option<&AuthUser> {
        self.extensions().get::<AuthUser>()
    }

    fn auth_user_id(&self) -> Option<&str> {
        self.auth_user().map(|u| u.id.as_str())
    }

    fn auth_user_email(&self) -> Option<&str> {
        self.auth_user().map(|u| u.email.as_str())
    }

    fn auth_user_role(&self) -> Option<&str> {
        self.auth_user().map(|u| u.role.as_str())
    }
}
