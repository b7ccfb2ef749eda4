//! Cross-cutting middleware for Trellis.
//!
//! - [`Recovery`]: catches handler panics and reports a 500 envelope.
//!   Register it first so it wraps everything else.
//! - [`RequestLog`]: assigns a request id and logs method, path,
//!   status, and elapsed time.
//! - [`Cors`]: permissive cross-origin headers for a configured origin,
//!   short-circuiting `OPTIONS` preflights.
//! - [`RateLimit`] / [`RateLimiter`] / [`LimiterRegistry`]: token-bucket
//!   admission control with background bucket reclamation.
//! - [`Csrf`] / [`CsrfStore`]: session-bound CSRF tokens with
//!   constant-time validation.
//! - [`cookie`]: the small cookie parser/builder the stages share.

pub mod cookie;
pub mod cors;
pub mod csrf;
pub mod logging;
pub mod rate_limit;
pub mod recovery;

pub use cookie::{Cookies, SameSite, SetCookie};
pub use cors::Cors;
pub use csrf::{Csrf, CsrfStore};
pub use logging::{RequestId, RequestLog};
pub use rate_limit::{Admission, LimiterRegistry, RateLimit, RateLimiter};
pub use recovery::Recovery;
