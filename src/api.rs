//! Plain HTTP glue around the paper pipeline
//!
//! These routes mirror the `get_arxiv_abstract` and `summarize_arxiv_paper` tools for
//! clients that do not speak the protocol.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        papers::{fetch_paper_abstract, PaperAbstract},
        utils::validate_summary_length,
    },
    errors::AppError,
    AppState,
};

pub const LIVENESS_MESSAGE: &str = "Hello from the paper tools MCP server!";
const INVALID_QUERY: &str = "Invalid query parameters";

#[derive(Debug, Deserialize)]
pub struct SummarizeQuery {
    pub max_length: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperSummary {
    pub arxiv_id: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub summary: String,
}

pub async fn message() -> &'static str {
    LIVENESS_MESSAGE
}

pub async fn debug_abstract(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaperAbstract>, AppError> {
    let paper = fetch_paper_abstract(state.papers.as_ref(), &id)
        .await
        .map_err(|err| AppError::upstream("Failed to fetch abstract", err))?;
    Ok(Json(paper))
}

pub async fn summarize(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<SummarizeQuery>, QueryRejection>,
) -> Result<Json<PaperSummary>, AppError> {
    let Query(query) =
        query.map_err(|rejection| AppError::invalid_input(INVALID_QUERY, rejection.body_text()))?;
    let max_length = validate_summary_length(query.max_length)
        .map_err(|message| AppError::invalid_input(INVALID_QUERY, message))?
        .unwrap_or(state.default_summary_length);

    let paper = fetch_paper_abstract(state.papers.as_ref(), &id)
        .await
        .map_err(|err| AppError::upstream("Failed to fetch abstract", err))?;
    let summary = state
        .summarizer
        .summarize(&paper.abstract_text, max_length)
        .await
        .map_err(|err| AppError::upstream("Failed to summarize", err))?;

    Ok(Json(PaperSummary {
        arxiv_id: paper.arxiv_id,
        abstract_text: paper.abstract_text,
        summary,
    }))
}
