//! Tools exposed via Model Context Protocol
//!
//! `echo`, `get_arxiv_abstract` and `summarize_arxiv_paper`, registered once at startup
//! against the shared paper and summarizer clients.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use rust_mcp_sdk::schema::{CallToolResult, ContentBlock, TextContent};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::domain::papers::{fetch_paper_abstract, AbstractFetcher};
use crate::domain::summarizer::Summarizer;
use crate::domain::utils::validate_summary_length;
use crate::mcp::registry::{RegistryError, ToolError, ToolRegistry};
use crate::mcp::schema::ValidationError;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EchoArgs {
    /// Text returned verbatim.
    pub message: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AbstractArgs {
    /// arXiv identifier such as `2301.00001` or `hep-th/9901001`.
    pub arxiv_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SummarizeArgs {
    /// arXiv identifier such as `2301.00001` or `hep-th/9901001`.
    pub arxiv_id: String,
    /// Upper bound on the summary length in tokens.
    #[schemars(range(min = 16, max = 1024))]
    pub max_length: Option<u32>,
}

pub fn build_registry(
    papers: Arc<dyn AbstractFetcher>,
    summarizer: Arc<dyn Summarizer>,
    default_summary_length: u32,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register_typed("echo", "Echo a message back", |args: EchoArgs| async move {
        Ok::<_, ToolError>(args.message)
    })?;

    let fetcher = Arc::clone(&papers);
    registry.register_typed(
        "get_arxiv_abstract",
        "Fetch the abstract of an arXiv paper",
        move |args: AbstractArgs| {
            let fetcher = Arc::clone(&fetcher);
            async move {
                let paper = fetch_paper_abstract(fetcher.as_ref(), &args.arxiv_id).await?;
                Ok::<_, ToolError>(paper_result(
                    paper.abstract_text.clone(),
                    [
                        ("arxivId", json!(paper.arxiv_id)),
                        ("abstract", json!(paper.abstract_text)),
                    ],
                ))
            }
        },
    )?;

    registry.register_typed(
        "summarize_arxiv_paper",
        "Fetch an arXiv abstract and summarize it",
        move |args: SummarizeArgs| {
            let papers = Arc::clone(&papers);
            let summarizer = Arc::clone(&summarizer);
            async move {
                let max_length = validate_summary_length(args.max_length)
                    .map_err(|message| ValidationError::single("arguments.max_length", message))?
                    .unwrap_or(default_summary_length);

                let paper = fetch_paper_abstract(papers.as_ref(), &args.arxiv_id).await?;
                let summary = summarizer
                    .summarize(&paper.abstract_text, max_length)
                    .await?;

                Ok::<_, ToolError>(paper_result(
                    summary.clone(),
                    [
                        ("arxivId", json!(paper.arxiv_id)),
                        ("abstract", json!(paper.abstract_text)),
                        ("summary", json!(summary)),
                    ],
                ))
            }
        },
    )?;

    Ok(registry)
}

fn paper_result<const N: usize>(text: String, fields: [(&str, Value); N]) -> CallToolResult {
    let mut structured = fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect::<Map<_, _>>();
    structured.insert(
        "fetched_at_utc".to_string(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );

    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: Some(structured),
    }
}
