//! Response envelope builders.
//!
//! Every JSON response the framework produces uses one of two shapes:
//!
//! - Success: `{"success": true, "data": <payload>, "meta": <optional>}`
//! - Error:   `{"success": false, "error": <string or field-error map>}`
//!
//! # Example
//!
//! ```
//! use trellis_core::envelope;
//! use http::StatusCode;
//!
//! let response = envelope::success(StatusCode::OK, serde_json::json!({"id": 42}));
//! assert_eq!(response.status(), StatusCode::OK);
//! ```

use bytes::Bytes;
use http::{header, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::json;

use crate::error::FieldErrors;
use crate::types::Response;

/// Builds a success envelope with the given status and payload.
#[must_use]
pub fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    let body = json!({
        "success": true,
        "data": serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
    });
    json_response(status, &body)
}

/// Builds a success envelope carrying a `meta` object alongside the payload.
#[must_use]
pub fn success_with_meta<T: Serialize, M: Serialize>(
    status: StatusCode,
    data: T,
    meta: M,
) -> Response {
    let body = json!({
        "success": true,
        "data": serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        "meta": serde_json::to_value(meta).unwrap_or(serde_json::Value::Null),
    });
    json_response(status, &body)
}

/// Builds an empty 204 No Content response.
#[must_use]
pub fn no_content() -> Response {
    http::Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Full::new(Bytes::new()))
        .expect("valid response")
}

/// Builds an error envelope with a string message.
#[must_use]
pub fn error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = json!({
        "success": false,
        "error": message.into(),
    });
    json_response(status, &body)
}

/// Builds an error envelope whose `error` value is a field-error map.
#[must_use]
pub fn field_errors(status: StatusCode, fields: &FieldErrors) -> Response {
    let body = json!({
        "success": false,
        "error": serde_json::to_value(fields).unwrap_or(serde_json::Value::Null),
    });
    json_response(status, &body)
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response {
    http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("valid response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_success_shape() {
        let response = success(StatusCode::CREATED, json!({"id": 1}));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], 1);
        assert!(body.get("meta").is_none());
    }

    #[tokio::test]
    async fn test_success_with_meta_shape() {
        let response = success_with_meta(StatusCode::OK, json!([1, 2]), json!({"total": 2}));
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["meta"]["total"], 2);
    }

    #[tokio::test]
    async fn test_error_shape() {
        let response = error(StatusCode::FORBIDDEN, "no entry");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "no entry");
    }

    #[tokio::test]
    async fn test_field_errors_shape() {
        let mut fields = FieldErrors::new();
        fields.add("email", "required");

        let response = field_errors(StatusCode::UNPROCESSABLE_ENTITY, &fields);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["email"][0], "required");
    }

    #[test]
    fn test_no_content() {
        let response = no_content();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
