use std::time::Instant;

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Logs one summary line per exchange. Streaming responses are logged when headers go out.
///
/// Everything logged while the request is handled (dispatcher audit lines included) runs
/// inside an `http` span carrying the method and path.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = info_span!("http", method = %method, path = %path);
    let started_at = Instant::now();

    let response = next.run(request).instrument(span.clone()).await;
    let status = response.status();

    span.in_scope(|| {
        info!(
            status = status.as_u16(),
            duration_ms = started_at.elapsed().as_millis(),
            "request summary"
        );

        match status {
            StatusCode::UNAUTHORIZED => warn!("authentication failure"),
            StatusCode::PAYLOAD_TOO_LARGE => warn!("request body rejected as too large"),
            status if status.is_server_error() => {
                warn!(status = status.as_u16(), "upstream or server failure")
            }
            _ => {}
        }
    });

    response
}
