//! Unified error handling for the admin API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::services::completion::CompletionError;
use crate::services::images::RegistryError;
use crate::upstream::UpstreamError;

/// Application-level error type for the admin API.
#[derive(Debug, Error)]
pub enum AppError {
    /// A source or collaborator needed by the request is not configured.
    #[error("{0}")]
    Config(String),

    /// An upstream source call failed.
    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    /// An upstream rejection whose JSON body is passed back to the client.
    #[error("{message}")]
    UpstreamDetailed {
        status: StatusCode,
        message: String,
        details: Value,
        /// Hint for the dashboard (`force_required`, `check_dependencies`)
        suggestion: Option<&'static str>,
    },

    /// Completion API call failed.
    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    /// Generated-image registry failed.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request signature or credentials rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap an upstream error, passing a 4xx body back to the client with
    /// the most specific message the body carries.
    #[must_use]
    pub fn upstream_detailed(error: UpstreamError) -> Self {
        match error {
            UpstreamError::Api {
                status,
                message,
                body,
                ..
            } if (400..500).contains(&status) => Self::UpstreamDetailed {
                status: StatusCode::BAD_REQUEST,
                message: detailed_message(&body).unwrap_or(message),
                details: body,
                suggestion: None,
            },
            other => Self::Upstream(other),
        }
    }

    /// The HTTP status this error renders with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Config(_) | Self::Internal(_) | Self::Completion(_) | Self::Registry(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Upstream(e) => e
                .status()
                .filter(|s| (400..500).contains(s))
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::UpstreamDetailed { status, .. } => *status,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> Value {
        let message = match self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(m) | Self::BadRequest(m) | Self::Unauthorized(m) => m.clone(),
            _ => self.to_string(),
        };

        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(message));
        match self {
            Self::Upstream(UpstreamError::Api { code, body: details, .. }) => {
                if let Some(code) = code {
                    body.insert("code".to_string(), json!(code));
                }
                if !details.is_null() {
                    body.insert("details".to_string(), details.clone());
                }
            }
            Self::UpstreamDetailed {
                details, suggestion, ..
            } => {
                if let Some(code) = details.get("code") {
                    body.insert("code".to_string(), code.clone());
                }
                if !details.is_null() {
                    body.insert("details".to_string(), details.clone());
                }
                if let Some(suggestion) = suggestion {
                    body.insert("suggestion".to_string(), json!(suggestion));
                }
            }
            _ => {}
        }
        Value::Object(body)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Admin request error"
            );
        }

        (status, Json(self.body())).into_response()
    }
}

/// The most specific message an upstream error body carries.
fn detailed_message(body: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .or_else(|| body.pointer("/data/message").and_then(Value::as_str))
        .map(String::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order-123".to_string());
        assert_eq!(err.to_string(), "Not found: order-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            let response = err.into_response();
            response.status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Config("Commerce source not configured".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_status_mirroring() {
        let not_found = AppError::from(UpstreamError::NotFound("order 9".to_string()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let rate_limited = AppError::from(UpstreamError::RateLimited(30));
        assert_eq!(rate_limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let server = AppError::from(UpstreamError::Api {
            status: 503,
            code: None,
            message: "down".to_string(),
            body: Value::Null,
        });
        assert_eq!(server.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let parse = AppError::from(UpstreamError::Parse("eof".to_string()));
        assert_eq!(parse.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_config_message_is_exposed() {
        let err = AppError::Config("Commerce source not configured".to_string());
        assert_eq!(
            err.body(),
            json!({"error": "Commerce source not configured"})
        );
    }

    #[test]
    fn test_internal_message_is_hidden() {
        let err = AppError::Internal("disk full at /var".to_string());
        assert_eq!(err.body(), json!({"error": "Internal server error"}));
    }

    #[test]
    fn test_upstream_detailed_prefers_nested_message() {
        let err = AppError::upstream_detailed(UpstreamError::Api {
            status: 400,
            code: Some("woocommerce_rest_invalid_product_id".to_string()),
            message: "fallback".to_string(),
            body: json!({"code": "woocommerce_rest_invalid_product_id", "data": {"message": "Producto inválido"}}),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let body = err.body();
        assert_eq!(body["error"], "Producto inválido");
        assert_eq!(body["code"], "woocommerce_rest_invalid_product_id");
        assert_eq!(body["details"]["data"]["message"], "Producto inválido");
    }

    #[test]
    fn test_upstream_detailed_keeps_server_errors() {
        let err = AppError::upstream_detailed(UpstreamError::Api {
            status: 500,
            code: None,
            message: "boom".to_string(),
            body: Value::Null,
        });
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[test]
    fn test_suggestion_rendered() {
        let err = AppError::UpstreamDetailed {
            status: StatusCode::BAD_REQUEST,
            message: "Terms do not support trashing.".to_string(),
            details: json!({"code": "rest_trash_not_supported"}),
            suggestion: Some("force_required"),
        };
        let body = err.body();
        assert_eq!(body["suggestion"], "force_required");
        assert_eq!(body["code"], "rest_trash_not_supported");
    }
}
