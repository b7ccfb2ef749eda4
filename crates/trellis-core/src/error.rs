//! The standard error type for Trellis.
//!
//! Errors fall into three families the rest of the stack relies on:
//!
//! - **Client errors** (400–429): reported to the caller in the error
//!   envelope with their mapped status code.
//! - **Internal errors** (500): the message is reported, the source chain
//!   is logged but never serialized to the client.
//! - **Dependency errors** (503): a collaborator (database, cache, queue)
//!   is unreachable.
//!
//! Programmer errors (invalid SQL identifiers, unresolvable scan
//! targets) are *not* values of this type. They panic and are recovered
//! by the panic-recovery middleware, which reports a 500.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::envelope;
use crate::types::Response;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Standard error type for request handling.
///
/// # Example
///
/// ```
/// use trellis_core::Error;
/// use http::StatusCode;
///
/// let err = Error::not_found("user 42 does not exist");
/// assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The request body was malformed (unparseable JSON, oversized body).
    #[error("bad request: {message}")]
    BadRequest {
        /// Human-readable error message.
        message: String,
    },

    /// Credentials were absent or invalid.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// The caller is known but not allowed (CSRF failure, missing role).
    #[error("forbidden: {message}")]
    Authorization {
        /// Human-readable error message.
        message: String,
    },

    /// Route or resource not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// The request was well-formed but semantically invalid.
    #[error("validation failed: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
        /// Field-specific validation errors, if any.
        fields: Option<FieldErrors>,
    },

    /// The caller exceeded its rate limit.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Human-readable error message.
        message: String,
        /// Seconds until the caller may retry.
        retry_after_seconds: u64,
    },

    /// Something unexpected went wrong inside the service.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (logged, never serialized to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A dependency (database, cache, upstream) is down.
    #[error("service unavailable: {message}")]
    Unavailable {
        /// Human-readable error message.
        message: String,
    },
}

impl Error {
    /// Creates a bad-request error (malformed body).
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a validation error with a message only.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields: None,
        }
    }

    /// Creates a validation error with field-specific errors.
    #[must_use]
    pub fn validation_with_fields(message: impl Into<String>, fields: FieldErrors) -> Self {
        Self::Validation {
            message: message.into(),
            fields: Some(fields),
        }
    }

    /// Creates a rate-limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after_seconds: u64) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_seconds,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error wrapping a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a dependency-unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::Authorization { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Renders this error as an error-envelope response.
    ///
    /// Validation errors with field details serialize the field map as
    /// the `error` value; every other variant serializes its message.
    #[must_use]
    pub fn into_response(self) -> Response {
        match &self {
            Self::Validation {
                fields: Some(fields),
                ..
            } => envelope::field_errors(self.status_code(), fields),
            Self::RateLimited {
                retry_after_seconds,
                ..
            } => {
                let retry = *retry_after_seconds;
                let mut response = envelope::error(self.status_code(), self.to_string());
                if let Ok(value) = http::HeaderValue::from_str(&retry.to_string()) {
                    response.headers_mut().insert(http::header::RETRY_AFTER, value);
                }
                response
            }
            _ => envelope::error(self.status_code(), self.to_string()),
        }
    }
}

/// Field-specific validation errors.
///
/// Maps a field path to the list of messages for that field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldErrors {
    /// Map of field path to error messages.
    #[serde(flatten)]
    pub fields: HashMap<String, Vec<String>>,
}

impl FieldErrors {
    /// Creates an empty `FieldErrors`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error message for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Returns `true` if there are no field errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
