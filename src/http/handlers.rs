//! Axum HTTP handlers for the web server
//!
//! Provides the streamable MCP endpoint plus the health and discovery metadata endpoints.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{stream, StreamExt};
use serde::Serialize;
use serde_json::json;

use crate::errors::AppError;
use crate::http::transport::{TransportError, TransportMethod, TransportRequest, TransportResponse};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
    pub tools: Vec<String>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp",
        tools: state
            .transport
            .server()
            .registry()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

pub async fn mcp_endpoint(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return AppError::from(TransportError::PayloadTooLarge {
                limit: state.transport.max_body_bytes(),
            })
            .into_response()
        }
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "mcp request body could not be read");
            return AppError::from(TransportError::BodyRead).into_response();
        }
    };

    let request = TransportRequest {
        method: TransportMethod::parse(method.as_str()),
        accept: header_value(&headers, header::ACCEPT),
        content_type: header_value(&headers, header::CONTENT_TYPE),
        body: &body,
    };

    match state.transport.handle(request).await {
        Ok(TransportResponse::Json(payload)) => (StatusCode::OK, Json(payload)).into_response(),
        Ok(TransportResponse::Accepted) => StatusCode::ACCEPTED.into_response(),
        Ok(TransportResponse::EventStream(messages)) => {
            let events =
                messages.map(|message| Event::default().event("message").json_data(message));
            Sse::new(events).into_response()
        }
        Ok(TransportResponse::Subscribe) => subscription(&state).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

/// Keeps a server-to-client channel open until the client disconnects.
///
/// Every registered tool is static, so nothing is pushed after the `ready` event apart from
/// keep-alive comments.
fn subscription(state: &AppState) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let ready = Event::default().event("ready").data(
        json!({
            "server": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "tools": state.transport.server().registry().len(),
        })
        .to_string(),
    );

    let events =
        stream::once(async move { Ok::<Event, Infallible>(ready) }).chain(stream::pending());

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(state.sse_keep_alive)
            .text("keepalive"),
    )
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
