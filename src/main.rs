use std::sync::Arc;

use paper_tools_mcp::{
    build_app,
    config::Config,
    domain::{
        papers::{AbstractFetcher, ArxivClient},
        summarizer::{Summarizer, UnconfiguredSummarizer, WorkersAiSummarizer},
    },
    logging, AppState, ServerSettings,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;

    let papers: Arc<dyn AbstractFetcher> = Arc::new(ArxivClient::new(
        config.arxiv_api_base.clone(),
        config.upstream_timeout,
    )?);
    let summarizer: Arc<dyn Summarizer> = match &config.workers_ai {
        Some(settings) => Arc::new(WorkersAiSummarizer::new(settings, config.upstream_timeout)?),
        None => {
            warn!("Workers AI credentials are unset, summarization is disabled");
            Arc::new(UnconfiguredSummarizer)
        }
    };

    let state = AppState::new(ServerSettings::from(&config), papers, summarizer)?;
    let tools = state.transport.server().registry().len();
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        auth = config.api_token.is_some(),
        tools,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
