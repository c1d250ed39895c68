//! Response plumbing for the plugin protocol: every reply carries the
//! Docker plugin content type, and every failure becomes HTTP 500 with
//! an `{"Err": ...}` envelope.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use plugin_proto::{CONTENT_TYPE, ErrorResponse};
use serde::Serialize;

/// Serialize a successful response body with the plugin content type.
pub fn respond<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => PluginError(format!("response encoding failed: {e}")).into_response(),
    }
}

/// The empty `{}` success body used by methods with no payload.
pub fn respond_empty() -> Response {
    respond(&serde_json::json!({}))
}

/// A failed method call, reported to Docker as the error envelope.
pub struct PluginError(pub String);

impl<E: std::error::Error> From<E> for PluginError {
    fn from(e: E) -> Self {
        PluginError(e.to_string())
    }
}

impl IntoResponse for PluginError {
    fn into_response(self) -> Response {
        let body = serde_json::to_vec(&ErrorResponse { err: self.0 })
            .unwrap_or_else(|_| br#"{"Err":"internal error"}"#.to_vec());
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, CONTENT_TYPE)],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn respond_sets_plugin_content_type() {
        let response = respond(&serde_json::json!({"Scope": "local"}));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            CONTENT_TYPE
        );
    }

    #[tokio::test]
    async fn plugin_error_becomes_500_with_envelope() {
        let response = PluginError("boom".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({"Err": "boom"}));
    }

    #[tokio::test]
    async fn respond_empty_is_empty_object() {
        let response = respond_empty();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"{}");
    }
}
