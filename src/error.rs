//! Error types for the proxy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::translate::chat_types::ErrorResponse;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("No credential available for deployment '{deployment}'")]
    MissingCredential { deployment: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Upstream error: {message}")]
    Upstream { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProxyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn missing_credential(deployment: impl Into<String>) -> Self {
        Self::MissingCredential {
            deployment: deployment.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream {
            message: msg.into(),
        }
    }

    /// Status code reported to the caller when this error ends a request.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential { .. } => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest { .. } | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { .. } | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Config { .. } | Self::Io(_) | Self::Toml(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// OpenAI-style error body describing this error.
    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            Self::MissingCredential { .. } => ErrorResponse::new(
                "authentication_error",
                "missing_credential",
                self.to_string(),
            ),
            Self::InvalidRequest { .. } | Self::Json(_) => ErrorResponse::new(
                "invalid_request_error",
                "invalid_request",
                self.to_string(),
            ),
            Self::Upstream { .. } | Self::Http(_) => ErrorResponse::new(
                "proxy_error",
                "bad_gateway",
                "Failed to connect to upstream API",
            ),
            Self::Config { .. } | Self::Io(_) | Self::Toml(_) => {
                ErrorResponse::new("proxy_error", "internal_error", self.to_string())
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");
        (self.status(), Json(self.to_error_response())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::missing_credential("gpt-4o").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProxyError::invalid_request("no model").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::upstream("connection refused").status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_upstream_error_body_is_generic() {
        let body = ProxyError::upstream("dns failure for secret-host").to_error_response();
        assert_eq!(body.error.error_type, "proxy_error");
        assert_eq!(body.error.code.as_deref(), Some("bad_gateway"));
        assert!(!body.error.message.contains("secret-host"));
    }
}
