//! Text summarization through a managed inference endpoint
//!
//! [`WorkersAiSummarizer`] posts to the Workers AI REST API (`/ai/run/{model}`) with the
//! model's `{input_text, max_length}` contract and reads `result.summary`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::papers::UpstreamError;

pub const DEFAULT_WORKERS_AI_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_SUMMARY_MODEL: &str = "@cf/facebook/bart-large-cnn";

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, max_length: u32) -> Result<String, UpstreamError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkersAiSettings {
    pub base_url: String,
    pub account_id: String,
    pub api_token: String,
    pub model: String,
}

impl WorkersAiSettings {
    pub fn endpoint(&self) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url.trim_end_matches('/'),
            self.account_id,
            self.model
        )
    }
}

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    input_text: &'a str,
    max_length: u32,
}

#[derive(Debug, Deserialize)]
struct WorkersAiEnvelope {
    #[serde(default)]
    result: Option<SummaryResult>,
    #[serde(default)]
    errors: Vec<WorkersAiMessage>,
}

#[derive(Debug, Deserialize)]
struct SummaryResult {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct WorkersAiMessage {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct WorkersAiSummarizer {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
}

impl WorkersAiSummarizer {
    pub fn new(settings: &WorkersAiSettings, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint(),
            api_token: settings.api_token.clone(),
        })
    }
}

#[async_trait]
impl Summarizer for WorkersAiSummarizer {
    async fn summarize(&self, text: &str, max_length: u32) -> Result<String, UpstreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&SummarizeRequest {
                input_text: text,
                max_length,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let envelope: WorkersAiEnvelope = response
            .json()
            .await
            .map_err(|err| UpstreamError::Malformed(err.to_string()))?;
        parse_summary(envelope)
    }
}

fn parse_summary(envelope: WorkersAiEnvelope) -> Result<String, UpstreamError> {
    match envelope.result {
        Some(result) if !result.summary.trim().is_empty() => Ok(result.summary.trim().to_string()),
        _ => {
            let reason = envelope
                .errors
                .into_iter()
                .map(|error| error.message)
                .filter(|message| !message.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            Err(UpstreamError::Malformed(if reason.is_empty() {
                "response carried no summary".to_string()
            } else {
                reason
            }))
        }
    }
}

/// Stand-in used when no inference credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredSummarizer;

#[async_trait]
impl Summarizer for UnconfiguredSummarizer {
    async fn summarize(&self, _text: &str, _max_length: u32) -> Result<String, UpstreamError> {
        Err(UpstreamError::NotConfigured("summarization"))
    }
}
