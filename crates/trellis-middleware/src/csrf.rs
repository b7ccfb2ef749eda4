//! CSRF protection.
//!
//! Every request is issued a session-bound token: the session id lives
//! in an `HttpOnly; SameSite=Strict` cookie, the token in a readable
//! `SameSite=Strict` cookie so clients can echo it back. State-changing
//! methods (`POST`, `PUT`, `PATCH`, `DELETE`) must present the token
//! via the `X-CSRF-Token` header, a `_token` form field, or a `_token`
//! query parameter; the comparison against the stored token is
//! constant-time. Safe methods pass through but still trigger issuance
//! so a page load obtains the token.
//!
//! Tokens expire two hours after issuance; expired entries are treated
//! as absent and regenerated on the next request.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

use trellis_core::{BoxFuture, Error, Middleware, Next, Request, Response};

use crate::cookie::{Cookies, SameSite, SetCookie};

/// Header checked first for the submitted token.
pub const TOKEN_HEADER: &str = "x-csrf-token";
/// Form field and query parameter checked after the header.
pub const TOKEN_FIELD: &str = "_token";
/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session_id";
/// Cookie carrying the readable token.
pub const TOKEN_COOKIE: &str = "csrf_token";

const TOKEN_BYTES: usize = 32;
const SESSION_ID_BYTES: usize = 16;
const DEFAULT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Constant-time equality over the raw token bytes.
fn tokens_match(stored: &str, submitted: &str) -> bool {
    stored.as_bytes().ct_eq(submitted.as_bytes()).into()
}

struct StoredToken {
    value: String,
    expires_at: Instant,
}

/// In-memory, session-keyed CSRF token store.
///
/// Expired entries are logically absent: lookups discard them and
/// issuance replaces them, so the map never outgrows the live session
/// set.
pub struct CsrfStore {
    tokens: RwLock<HashMap<String, StoredToken>>,
    ttl: Duration,
}

impl CsrfStore {
    /// Creates a store with the default two-hour token lifetime.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Creates a store with a custom token lifetime.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            tokens: RwLock::new(HashMap::new()),
            ttl,
        })
    }

    /// Token lifetime in use.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live token for a session, generating and storing a
    /// fresh one when the session has none or only an expired one.
    pub fn token_for(&self, session_id: &str) -> String {
        let mut tokens = self.tokens.write();

        if let Some(stored) = tokens.get(session_id) {
            if Instant::now() < stored.expires_at {
                return stored.value.clone();
            }
            tokens.remove(session_id);
        }

        let value = random_urlsafe(TOKEN_BYTES);
        tokens.insert(
            session_id.to_string(),
            StoredToken {
                value: value.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        value
    }

    /// Validates a submitted token against the stored token for a
    /// session. Absent or expired stored tokens never validate.
    #[must_use]
    pub fn validate(&self, session_id: &str, submitted: &str) -> bool {
        let tokens = self.tokens.read();
        let Some(stored) = tokens.get(session_id) else {
            return false;
        };
        if Instant::now() >= stored.expires_at {
            return false;
        }
        tokens_match(&stored.value, submitted)
    }

    /// Drops the token for a session (logout).
    pub fn remove_session(&self, session_id: &str) {
        self.tokens.write().remove(session_id);
    }

    /// Number of stored tokens, including not-yet-collected expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    /// Returns `true` if the store holds no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

/// CSRF middleware: issues tokens on every request and gates
/// state-changing methods on a valid submission.
pub struct Csrf {
    store: Arc<CsrfStore>,
}

impl Csrf {
    /// Creates the middleware around a shared store.
    #[must_use]
    pub fn new(store: Arc<CsrfStore>) -> Self {
        Self { store }
    }

    fn submitted_token(request: &Request) -> Option<String> {
        if let Some(token) = request
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }

        let is_form = request
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/x-www-form-urlencoded"));
        if is_form {
            let fields: Vec<(String, String)> =
                serde_urlencoded::from_bytes(request.body()).unwrap_or_default();
            if let Some((_, token)) = fields.into_iter().find(|(name, _)| name == TOKEN_FIELD) {
                if !token.is_empty() {
                    return Some(token);
                }
            }
        }

        let query: Vec<(String, String)> = request
            .uri()
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();
        query
            .into_iter()
            .find(|(name, _)| name == TOKEN_FIELD)
            .map(|(_, token)| token)
            .filter(|token| !token.is_empty())
    }
}

impl Middleware for Csrf {
    fn name(&self) -> &'static str {
        "csrf"
    }

    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let cookies = Cookies::from_request(&request);
            let (session_id, new_session) = match cookies.get(SESSION_COOKIE) {
                Some(existing) if !existing.is_empty() => (existing.to_string(), false),
                _ => (random_urlsafe(SESSION_ID_BYTES), true),
            };

            let token = self.store.token_for(&session_id);

            let method = request.method().clone();
            let safe_method = method == http::Method::GET
                || method == http::Method::HEAD
                || method == http::Method::OPTIONS;

            let mut response = if safe_method {
                next.run(request).await
            } else {
                let valid = Self::submitted_token(&request)
                    .is_some_and(|submitted| self.store.validate(&session_id, &submitted));
                if valid {
                    next.run(request).await
                } else {
                    tracing::warn!(method = %method, "CSRF token validation failed");
                    Error::authorization("CSRF token validation failed").into_response()
                }
            };

            let max_age = self.store.ttl().as_secs();
            if new_session {
                SetCookie::new(SESSION_COOKIE, session_id.as_str())
                    .path("/")
                    .max_age(max_age)
                    .http_only(true)
                    .same_site(SameSite::Strict)
                    .append_to(&mut response);
            }
            // Readable on purpose: clients echo it back in the header.
            SetCookie::new(TOKEN_COOKIE, token.as_str())
                .path("/")
                .max_age(max_age)
                .same_site(SameSite::Strict)
                .append_to(&mut response);

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use http_body_util::Full;

    fn ok_next() -> Next<'static> {
        Next::handler(|_req| {
            Box::pin(async {
                http::Response::builder()
                    .status(StatusCode::OK)
                    .body(Full::new(Bytes::from("OK")))
                    .unwrap()
            })
        })
    }

    fn get_request() -> Request {
        http::Request::builder()
            .method(Method::GET)
            .uri("/")
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn test_tokens_are_unique_and_urlsafe() {
        let a = random_urlsafe(TOKEN_BYTES);
        let b = random_urlsafe(TOKEN_BYTES);
        assert_ne!(a, b);
        // 32 bytes of entropy, unpadded URL-safe alphabet
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_store_reuses_live_token() {
        let store = CsrfStore::new();
        let first = store.token_for("s1");
        let second = store.token_for("s1");
        assert_eq!(first, second);
        assert_ne!(store.token_for("s2"), first);
    }

    #[test]
    fn test_store_regenerates_expired_token() {
        let store = CsrfStore::with_ttl(Duration::ZERO);
        let first = store.token_for("s1");
        let second = store.token_for("s1");
        assert_ne!(first, second);
    }

    #[test]
    fn test_validate() {
        let store = CsrfStore::new();
        let token = store.token_for("s1");

        assert!(store.validate("s1", &token));
        assert!(!store.validate("s1", "forged"));
        assert!(!store.validate("unknown-session", &token));
    }

    #[test]
    fn test_validate_rejects_expired_token() {
        let store = CsrfStore::with_ttl(Duration::ZERO);
        let token = store.token_for("s1");
        assert!(!store.validate("s1", &token));
    }

    #[test]
    fn test_constant_time_comparison_is_exact() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "ab"));
        assert!(!tokens_match("", "x"));
    }

    #[test]
    fn test_remove_session() {
        let store = CsrfStore::new();
        let token = store.token_for("s1");
        store.remove_session("s1");
        assert!(!store.validate("s1", &token));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_safe_method_issues_cookies() {
        let csrf = Csrf::new(CsrfStore::new());
        let response = csrf.handle(get_request(), ok_next()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let cookies: Vec<String> = response
            .headers()
            .get_all(http::header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert!(cookies.iter().any(|c| c.starts_with("session_id=")));
        assert!(cookies.iter().any(|c| c.starts_with("csrf_token=")));

        let session = cookies
            .iter()
            .find(|c| c.starts_with("session_id="))
            .unwrap();
        assert!(session.contains("HttpOnly"));
        assert!(session.contains("SameSite=Strict"));

        let token = cookies
            .iter()
            .find(|c| c.starts_with("csrf_token="))
            .unwrap();
        assert!(!token.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_post_without_token_is_403() {
        let csrf = Csrf::new(CsrfStore::new());
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/x")
            .body(Bytes::new())
            .unwrap();

        let response = csrf.handle(request, ok_next()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_post_with_header_token_is_admitted() {
        let store = CsrfStore::new();
        let csrf = Csrf::new(store.clone());

        // Simulate the page load that hands out session + token.
        let session_id = "known-session";
        let token = store.token_for(session_id);

        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/x")
            .header(http::header::COOKIE, format!("session_id={session_id}"))
            .header(TOKEN_HEADER, token.as_str())
            .body(Bytes::new())
            .unwrap();

        let response = csrf.handle(request, ok_next()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_post_with_form_token_is_admitted() {
        let store = CsrfStore::new();
        let csrf = Csrf::new(store.clone());

        let session_id = "form-session";
        let token = store.token_for(session_id);

        let body = serde_urlencoded::to_string([("_token", token.as_str()), ("name", "ada")])
            .unwrap();
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/x")
            .header(http::header::COOKIE, format!("session_id={session_id}"))
            .header(
                http::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(Bytes::from(body))
            .unwrap();

        let response = csrf.handle(request, ok_next()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_post_with_query_token_is_admitted() {
        let store = CsrfStore::new();
        let csrf = Csrf::new(store.clone());

        let session_id = "query-session";
        let token = store.token_for(session_id);

        let request = http::Request::builder()
            .method(Method::POST)
            .uri(format!("/x?_token={token}"))
            .header(http::header::COOKIE, format!("session_id={session_id}"))
            .body(Bytes::new())
            .unwrap();

        let response = csrf.handle(request, ok_next()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_post_with_wrong_token_is_403() {
        let store = CsrfStore::new();
        let csrf = Csrf::new(store.clone());

        let session_id = "s";
        let _ = store.token_for(session_id);

        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/x")
            .header(http::header::COOKIE, format!("session_id={session_id}"))
            .header(TOKEN_HEADER, "not-the-token")
            .body(Bytes::new())
            .unwrap();

        let response = csrf.handle(request, ok_next()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
