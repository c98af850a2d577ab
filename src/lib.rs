use std::{sync::Arc, time::Duration};

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{any, get},
    Router,
};

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;

use config::{Config, DEFAULT_SSE_KEEP_ALIVE_SECS};
use domain::{
    papers::AbstractFetcher, summarizer::Summarizer, tools::build_registry,
    utils::DEFAULT_SUMMARY_LENGTH,
};
use http::transport::{TransportBinding, DEFAULT_MAX_BODY_BYTES};
use mcp::{
    registry::{RegistryError, ToolRegistry},
    server::{McpServer, DEFAULT_BATCH_CONCURRENCY},
};

/// Server knobs that shape the HTTP surface, split from [`Config`] so tests can build them
/// directly.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub api_token: Option<String>,
    pub max_body_bytes: usize,
    pub batch_concurrency: usize,
    pub sse_keep_alive: Duration,
    pub default_summary_length: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_token: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            sse_keep_alive: Duration::from_secs(DEFAULT_SSE_KEEP_ALIVE_SECS),
            default_summary_length: DEFAULT_SUMMARY_LENGTH,
        }
    }
}

impl From<&Config> for ServerSettings {
    fn from(config: &Config) -> Self {
        Self {
            api_token: config.api_token.clone(),
            max_body_bytes: config.max_body_bytes,
            batch_concurrency: config.batch_concurrency,
            sse_keep_alive: config.sse_keep_alive,
            default_summary_length: config.summary_max_length,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub api_token: Option<Arc<str>>,
    pub transport: TransportBinding,
    pub papers: Arc<dyn AbstractFetcher>,
    pub summarizer: Arc<dyn Summarizer>,
    pub default_summary_length: u32,
    pub sse_keep_alive: Duration,
}

impl AppState {
    /// Registers the paper tools and wires them to the MCP dispatcher.
    pub fn new(
        settings: ServerSettings,
        papers: Arc<dyn AbstractFetcher>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self, RegistryError> {
        let registry = build_registry(
            Arc::clone(&papers),
            Arc::clone(&summarizer),
            settings.default_summary_length,
        )?;
        Ok(Self::with_registry(settings, registry, papers, summarizer))
    }

    pub fn with_registry(
        settings: ServerSettings,
        registry: ToolRegistry,
        papers: Arc<dyn AbstractFetcher>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        let server = McpServer::new(Arc::new(registry))
            .with_batch_concurrency(settings.batch_concurrency);

        Self {
            api_token: settings.api_token.map(Arc::<str>::from),
            transport: TransportBinding::new(Arc::new(server), settings.max_body_bytes),
            papers,
            summarizer,
            default_summary_length: settings.default_summary_length,
            sse_keep_alive: settings.sse_keep_alive,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/mcp", any(http::handlers::mcp_endpoint))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ))
        .layer(DefaultBodyLimit::max(state.transport.max_body_bytes()));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .route("/message", get(api::message))
        .route("/debug/{*id}", get(api::debug_abstract))
        .route("/summarize/{*id}", get(api::summarize))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
