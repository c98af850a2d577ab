//! arXiv abstract fetching
//!
//! [`AbstractFetcher`] is the narrow seam the tools and routes depend on; [`ArxivClient`]
//! implements it against the public arXiv Atom API.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::domain::utils::{collapse_whitespace, decode_xml_entities, normalize_arxiv_id};
use crate::mcp::registry::ToolError;
use crate::mcp::schema::ValidationError;

pub const DEFAULT_ARXIV_API_BASE: &str = "https://export.arxiv.org";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("`{0}` is not a valid arXiv identifier")]
    InvalidId(String),
    #[error("no paper found for arXiv id {0}")]
    NotFound(String),
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },
    #[error("upstream response could not be parsed: {0}")]
    Malformed(String),
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl UpstreamError {
    /// Message safe to hand to clients; transport-level detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Request(err) if err.is_timeout() => "upstream request timed out".to_string(),
            Self::Request(_) => "upstream request failed".to_string(),
            Self::Malformed(_) => "upstream response could not be parsed".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<UpstreamError> for ToolError {
    fn from(error: UpstreamError) -> Self {
        if let UpstreamError::InvalidId(_) = &error {
            return ToolError::InvalidArguments(ValidationError::single(
                "arguments.arxiv_id",
                error.to_string(),
            ));
        }
        ToolError::failed(error.public_message(), &error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperAbstract {
    pub arxiv_id: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

#[async_trait]
pub trait AbstractFetcher: Send + Sync {
    /// `arxiv_id` is already normalized.
    async fn fetch_abstract(&self, arxiv_id: &str) -> Result<String, UpstreamError>;
}

/// Normalizes the identifier, then fetches its abstract.
pub async fn fetch_paper_abstract(
    fetcher: &dyn AbstractFetcher,
    raw_id: &str,
) -> Result<PaperAbstract, UpstreamError> {
    let arxiv_id = normalize_arxiv_id(raw_id)?;
    let abstract_text = fetcher.fetch_abstract(&arxiv_id).await?;
    Ok(PaperAbstract {
        arxiv_id,
        abstract_text,
    })
}

#[derive(Debug, Clone)]
pub struct ArxivClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArxivClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl AbstractFetcher for ArxivClient {
    async fn fetch_abstract(&self, arxiv_id: &str) -> Result<String, UpstreamError> {
        let url = format!(
            "{}/api/query?id_list={arxiv_id}",
            self.base_url.trim_end_matches('/')
        );
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let feed = response.text().await?;
        extract_abstract(&feed, arxiv_id)
    }
}

/// Pulls the `<summary>` of the first `<entry>` out of an arXiv Atom feed.
pub fn extract_abstract(feed: &str, arxiv_id: &str) -> Result<String, UpstreamError> {
    let compile = |pattern: &str| {
        Regex::new(pattern).map_err(|err| UpstreamError::Malformed(format!("pattern: {err}")))
    };
    let feed_pattern = compile(r"<feed\b")?;
    let entry_pattern = compile(r"(?s)<entry\b[^>]*>(.*?)</entry>")?;
    let id_pattern = compile(r"(?s)<id\b[^>]*>(.*?)</id>")?;
    let summary_pattern = compile(r"(?s)<summary\b[^>]*>(.*?)</summary>")?;

    if !feed_pattern.is_match(feed) {
        return Err(UpstreamError::Malformed("response is not an Atom feed".to_string()));
    }

    let Some(entry) = entry_pattern
        .captures(feed)
        .and_then(|captures| captures.get(1))
    else {
        return Err(UpstreamError::NotFound(arxiv_id.to_string()));
    };

    // arXiv reports lookup failures as a single entry whose id points at its error docs.
    let is_error_entry = id_pattern
        .captures(entry.as_str())
        .and_then(|captures| captures.get(1))
        .is_some_and(|id| id.as_str().contains("/api/errors"));
    if is_error_entry {
        return Err(UpstreamError::NotFound(arxiv_id.to_string()));
    }

    let summary = summary_pattern
        .captures(entry.as_str())
        .and_then(|captures| captures.get(1))
        .map(|summary| collapse_whitespace(&decode_xml_entities(summary.as_str())))
        .filter(|summary| !summary.is_empty())
        .ok_or_else(|| UpstreamError::Malformed("entry has no summary".to_string()))?;

    Ok(summary)
}
