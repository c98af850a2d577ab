use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::{domain::papers::UpstreamError, http::transport::TransportError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {message}")]
    Unauthorized {
        code: &'static str,
        message: &'static str,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A pipeline route was called with unusable input.
    #[error("{context}: {details}")]
    InvalidInput {
        context: &'static str,
        details: String,
    },
    /// A pipeline route failed while talking to an external service.
    #[error("{context}: {source}")]
    Upstream {
        context: &'static str,
        #[source]
        source: UpstreamError,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

/// Body shape of the paper pipeline routes.
#[derive(Debug, Serialize)]
pub struct PipelineErrorResponse {
    pub error: String,
    pub details: String,
}

impl AppError {
    pub fn unauthorized(code: &'static str, message: &'static str) -> Self {
        Self::Unauthorized { code, message }
    }

    pub fn invalid_input(context: &'static str, details: impl Into<String>) -> Self {
        Self::InvalidInput {
            context,
            details: details.into(),
        }
    }

    pub fn upstream(context: &'static str, source: UpstreamError) -> Self {
        Self::Upstream { context, source }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized { code, message } => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse {
                        code: code.to_string(),
                        message: message.to_string(),
                        details: json!({}),
                    }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            Self::Transport(err) => {
                let status = match err {
                    TransportError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
                    TransportError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    TransportError::BodyRead => StatusCode::BAD_REQUEST,
                    TransportError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                };
                let details = match &err {
                    TransportError::PayloadTooLarge { limit } => json!({ "limit": limit }),
                    _ => json!({}),
                };
                let mut response = (
                    status,
                    Json(ErrorResponse {
                        code: err.code().to_string(),
                        message: err.to_string(),
                        details,
                    }),
                )
                    .into_response();
                if status == StatusCode::METHOD_NOT_ALLOWED {
                    response
                        .headers_mut()
                        .insert(header::ALLOW, HeaderValue::from_static("GET, POST"));
                }
                response
            }
            Self::InvalidInput { context, details } => (
                StatusCode::BAD_REQUEST,
                Json(PipelineErrorResponse {
                    error: context.to_string(),
                    details,
                }),
            )
                .into_response(),
            Self::Upstream { context, source } => {
                let status = match source {
                    UpstreamError::InvalidId(_) => StatusCode::BAD_REQUEST,
                    UpstreamError::NotFound(_) => StatusCode::NOT_FOUND,
                    UpstreamError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::BAD_GATEWAY,
                };
                tracing::error!(context, error = %source, "pipeline request failed");
                (
                    status,
                    Json(PipelineErrorResponse {
                        error: context.to_string(),
                        details: source.public_message(),
                    }),
                )
                    .into_response()
            }
        }
    }
}
