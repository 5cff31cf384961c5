//! Application-wide error types and their HTTP mapping.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// A failure reported by (or while talking to) a third-party API.
///
/// `kind` and `code` are copied from the vendor's error object when it has
/// one, so clients see exactly what Stripe or Cloudinary said.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct VendorError {
    pub message: String,
    pub kind: Option<String>,
    pub code: Option<String>,
}

impl VendorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
            code: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Transport-level failure (DNS, TLS, timeout, undecodable body).
    pub fn connection(err: reqwest::Error) -> Self {
        Self::new(err.to_string()).with_kind("api_connection_error")
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[error("Failed to delete asset: {0}")]
    AssetNotDeleted(String),

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge(rejection.body_text());
        }
        ApiError::Validation(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ErrorResponse {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: None,
            code: None,
            result: None,
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Vendor(_)
            | ApiError::AssetNotDeleted(_)
            | ApiError::Config(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Vendor(VendorError {
                message,
                kind,
                code,
            }) => {
                tracing::warn!(?kind, ?code, "vendor error: {message}");
                ErrorResponse {
                    error: message,
                    kind,
                    code,
                    result: None,
                }
            }
            ApiError::AssetNotDeleted(result) => {
                tracing::warn!("asset delete returned {result:?}");
                ErrorResponse {
                    error: format!("Failed to delete asset: {result}"),
                    kind: None,
                    code: None,
                    result: Some(result),
                }
            }
            ApiError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                ErrorResponse::message(err.to_string())
            }
            other => ErrorResponse::message(other.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = ApiError::Validation("Invalid amount".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn vendor_error_body_keeps_type_and_code() {
        let err = VendorError::new("Your card was declined.")
            .with_kind("card_error")
            .with_code("card_declined");
        let body = ErrorResponse {
            error: err.message.clone(),
            kind: err.kind.clone(),
            code: err.code.clone(),
            result: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "Your card was declined.");
        assert_eq!(json["type"], "card_error");
        assert_eq!(json["code"], "card_declined");
        assert!(json.get("result").is_none());
        assert_eq!(
            ApiError::from(err).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn plain_message_omits_optional_fields() {
        let json = serde_json::to_value(ErrorResponse::message("boom")).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "boom" }));
    }
}
