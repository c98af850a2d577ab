//! Streamable HTTP binding for the MCP dispatcher
//!
//! Works on plain request parts (method, `Accept`, `Content-Type`, body bytes) so the
//! protocol rules stay independent from axum; `http::handlers` does the conversion.

use std::sync::Arc;

use futures::{stream::BoxStream, StreamExt};
use serde_json::Value;
use thiserror::Error;

use crate::mcp::server::{decode_payload, DecodedPayload, Incoming, McpServer};

pub const JSON_MEDIA_TYPE: &str = "application/json";
pub const EVENT_STREAM_MEDIA_TYPE: &str = "text/event-stream";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMethod {
    Get,
    Post,
    Other(String),
}

impl TransportMethod {
    pub fn parse(method: &str) -> Self {
        match method {
            "GET" => Self::Get,
            "POST" => Self::Post,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportRequest<'a> {
    pub method: TransportMethod,
    pub accept: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
}

pub enum TransportResponse {
    /// One response object, or an array for batches.
    Json(Value),
    /// Nothing to answer (notifications only).
    Accepted,
    /// Response envelopes emitted one by one, in request order.
    EventStream(BoxStream<'static, Value>),
    /// Long-lived server-to-client stream opened with `GET`.
    Subscribe,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Accepted => f.write_str("Accepted"),
            Self::EventStream(_) => f.write_str("EventStream(..)"),
            Self::Subscribe => f.write_str("Subscribe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("method {0} is not allowed on the MCP endpoint")]
    MethodNotAllowed(String),
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("request body could not be read")]
    BodyRead,
    #[error("content type `{0}` is not supported, send application/json")]
    UnsupportedMediaType(String),
}

impl TransportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::BodyRead => "body_read_failed",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
        }
    }
}

#[derive(Clone)]
pub struct TransportBinding {
    server: Arc<McpServer>,
    max_body_bytes: usize,
}

impl TransportBinding {
    pub fn new(server: Arc<McpServer>, max_body_bytes: usize) -> Self {
        Self {
            server,
            max_body_bytes,
        }
    }

    pub fn server(&self) -> &Arc<McpServer> {
        &self.server
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub async fn handle(
        &self,
        request: TransportRequest<'_>,
    ) -> Result<TransportResponse, TransportError> {
        match request.method {
            TransportMethod::Post => self.handle_post(&request).await,
            TransportMethod::Get if names_media_type(request.accept, EVENT_STREAM_MEDIA_TYPE) => {
                Ok(TransportResponse::Subscribe)
            }
            TransportMethod::Get => Err(TransportError::MethodNotAllowed("GET".to_string())),
            TransportMethod::Other(method) => Err(TransportError::MethodNotAllowed(method)),
        }
    }

    async fn handle_post(
        &self,
        request: &TransportRequest<'_>,
    ) -> Result<TransportResponse, TransportError> {
        if request.body.len() > self.max_body_bytes {
            return Err(TransportError::PayloadTooLarge {
                limit: self.max_body_bytes,
            });
        }
        if let Some(content_type) = request.content_type {
            if !is_json_content_type(content_type) {
                return Err(TransportError::UnsupportedMediaType(
                    content_type.to_string(),
                ));
            }
        }

        let payload = decode_payload(request.body);
        if prefers_event_stream(request.accept) {
            return Ok(self.stream_responses(payload.into_items()).await);
        }

        match payload {
            DecodedPayload::Single(incoming) => Ok(self
                .server
                .handle_incoming(incoming)
                .await
                .map_or(TransportResponse::Accepted, TransportResponse::Json)),
            DecodedPayload::Batch(items) => {
                let responses: Vec<Value> =
                    Arc::clone(&self.server).responses(items).collect().await;
                if responses.is_empty() {
                    Ok(TransportResponse::Accepted)
                } else {
                    Ok(TransportResponse::Json(Value::Array(responses)))
                }
            }
        }
    }

    async fn stream_responses(&self, items: Vec<Incoming>) -> TransportResponse {
        let notifications_only = items.iter().all(Incoming::is_notification);
        let responses = Arc::clone(&self.server).responses(items);
        if notifications_only {
            // Nothing to stream back, but the notifications still have to run.
            responses.collect::<Vec<_>>().await;
            return TransportResponse::Accepted;
        }
        TransportResponse::EventStream(responses)
    }
}

fn media_types(header: &str) -> impl Iterator<Item = &str> {
    header
        .split(',')
        .map(|item| item.split(';').next().unwrap_or_default().trim())
        .filter(|item| !item.is_empty())
}

/// Whether the header names `media_type` explicitly (wildcards do not count).
pub fn names_media_type(header: Option<&str>, media_type: &str) -> bool {
    header.is_some_and(|header| {
        media_types(header).any(|candidate| candidate.eq_ignore_ascii_case(media_type))
    })
}

/// SSE is used only when the client names it and does not name JSON.
pub fn prefers_event_stream(accept: Option<&str>) -> bool {
    names_media_type(accept, EVENT_STREAM_MEDIA_TYPE) && !names_media_type(accept, JSON_MEDIA_TYPE)
}

pub fn is_json_content_type(content_type: &str) -> bool {
    media_types(content_type).next().is_some_and(|media_type| {
        media_type.eq_ignore_ascii_case(JSON_MEDIA_TYPE)
            || media_type.to_ascii_lowercase().ends_with("+json")
    })
}
