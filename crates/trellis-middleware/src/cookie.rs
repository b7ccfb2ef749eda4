//! Cookie parsing and response helpers.
//!
//! # Example
//!
//! ```
//! use trellis_middleware::cookie::{Cookies, SameSite, SetCookie};
//!
//! let cookies = Cookies::parse("session=abc123; theme=dark");
//! assert_eq!(cookies.get("session"), Some("abc123"));
//!
//! let cookie = SetCookie::new("session_id", "abc123")
//!     .path("/")
//!     .http_only(true)
//!     .same_site(SameSite::Strict)
//!     .max_age(7200);
//! assert!(cookie.header_value().contains("HttpOnly"));
//! ```

use http::header;
use std::collections::HashMap;
use std::fmt;

use trellis_core::{Request, Response};

/// Request cookies, parsed from the `Cookie` header(s).
#[derive(Debug, Clone, Default)]
pub struct Cookies {
    cookies: HashMap<String, String>,
}

impl Cookies {
    /// Creates an empty cookie set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a single `Cookie` header value.
    #[must_use]
    pub fn parse(header_value: &str) -> Self {
        let mut cookies = HashMap::new();
        for pair in header_value.split(';') {
            let pair = pair.trim();
            if let Some((name, value)) = pair.split_once('=') {
                cookies.insert(name.trim().to_string(), value.trim().to_string());
            }
        }
        Self { cookies }
    }

    /// Collects cookies from every `Cookie` header on a request.
    #[must_use]
    pub fn from_request(request: &Request) -> Self {
        let mut all = Self::new();
        for value in request.headers().get_all(header::COOKIE) {
            if let Ok(raw) = value.to_str() {
                all.cookies.extend(Self::parse(raw).cookies);
            }
        }
        all
    }

    /// Returns a cookie value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Returns the number of cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Returns `true` if no cookies were present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// Sent only in first-party contexts.
    Strict,
    /// Sent on top-level navigations.
    Lax,
    /// Sent in all contexts (requires `Secure`).
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

/// Builder for a `Set-Cookie` header.
#[derive(Debug, Clone)]
pub struct SetCookie {
    name: String,
    value: String,
    path: Option<String>,
    max_age: Option<u64>,
    http_only: bool,
    secure: bool,
    same_site: Option<SameSite>,
}

impl SetCookie {
    /// Creates a cookie with the given name and value.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            max_age: None,
            http_only: false,
            secure: false,
            same_site: None,
        }
    }

    /// Sets the `Path` attribute.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the `Max-Age` attribute in seconds.
    #[must_use]
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Sets the `HttpOnly` attribute.
    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Sets the `Secure` attribute.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the `SameSite` attribute.
    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Renders the `Set-Cookie` header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        let mut value = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            value.push_str("; Path=");
            value.push_str(path);
        }
        if let Some(max_age) = self.max_age {
            value.push_str(&format!("; Max-Age={max_age}"));
        }
        if let Some(same_site) = self.same_site {
            value.push_str(&format!("; SameSite={same_site}"));
        }
        if self.secure {
            value.push_str("; Secure");
        }
        if self.http_only {
            value.push_str("; HttpOnly");
        }
        value
    }

    /// Appends this cookie to a response.
    pub fn append_to(&self, response: &mut Response) {
        if let Ok(value) = http::HeaderValue::from_str(&self.header_value()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;

    #[test]
    fn test_parse_multiple_cookies() {
        let cookies = Cookies::parse("session=abc123; theme=dark; empty=");
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies.get("session"), Some("abc123"));
        assert_eq!(cookies.get("theme"), Some("dark"));
        assert_eq!(cookies.get("empty"), Some(""));
        assert_eq!(cookies.get("missing"), None);
    }

    #[test]
    fn test_parse_ignores_malformed_pairs() {
        let cookies = Cookies::parse("lonely; valid=1");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies.get("valid"), Some("1"));
    }

    #[test]
    fn test_from_request_merges_headers() {
        let request: Request = http::Request::builder()
            .uri("/")
            .header(header::COOKIE, "a=1")
            .header(header::COOKIE, "b=2")
            .body(Bytes::new())
            .unwrap();

        let cookies = Cookies::from_request(&request);
        assert_eq!(cookies.get("a"), Some("1"));
        assert_eq!(cookies.get("b"), Some("2"));
    }

    #[test]
    fn test_set_cookie_header_value() {
        let cookie = SetCookie::new("session_id", "xyz")
            .path("/")
            .max_age(7200)
            .same_site(SameSite::Strict)
            .http_only(true);

        let value = cookie.header_value();
        assert!(value.starts_with("session_id=xyz"));
        assert!(value.contains("Path=/"));
        assert!(value.contains("Max-Age=7200"));
        assert!(value.contains("SameSite=Strict"));
        assert!(value.contains("HttpOnly"));
        assert!(!value.contains("Secure"));
    }

    #[test]
    fn test_append_to_response_keeps_existing_cookies() {
        let mut response: Response = http::Response::builder()
            .body(Full::new(Bytes::new()))
            .unwrap();

        SetCookie::new("a", "1").append_to(&mut response);
        SetCookie::new("b", "2").append_to(&mut response);

        let values: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .collect();
        assert_eq!(values.len(), 2);
    }
}
