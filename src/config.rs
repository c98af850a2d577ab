use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;

use crate::domain::{
    papers::DEFAULT_ARXIV_API_BASE,
    summarizer::{WorkersAiSettings, DEFAULT_SUMMARY_MODEL, DEFAULT_WORKERS_AI_BASE_URL},
    utils::{validate_summary_length, DEFAULT_SUMMARY_LENGTH},
};
use crate::http::transport::DEFAULT_MAX_BODY_BYTES;
use crate::mcp::server::DEFAULT_BATCH_CONCURRENCY;

pub const DEFAULT_SSE_KEEP_ALIVE_SECS: u64 = 15;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub api_token: Option<String>,
    pub max_body_bytes: usize,
    pub batch_concurrency: usize,
    pub sse_keep_alive: Duration,
    pub arxiv_api_base: String,
    pub upstream_timeout: Duration,
    pub workers_ai: Option<WorkersAiSettings>,
    pub summary_max_length: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("{0} must be a positive integer")]
    InvalidPositive(&'static str),
    #[error("{0} must be an http(s) URL")]
    InvalidUrl(&'static str),
    #[error("WORKERS_AI_ACCOUNT_ID and WORKERS_AI_API_TOKEN must be set together")]
    PartialWorkersAi,
    #[error("SUMMARY_MAX_LENGTH is invalid: {0}")]
    InvalidSummaryLength(String),
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = value("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = value("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);

        let max_body_bytes =
            positive(value("MCP_MAX_BODY_BYTES"), "MCP_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;
        let batch_concurrency = positive(
            value("MCP_BATCH_CONCURRENCY"),
            "MCP_BATCH_CONCURRENCY",
            DEFAULT_BATCH_CONCURRENCY,
        )?;
        let sse_keep_alive = Duration::from_secs(positive(
            value("MCP_SSE_KEEP_ALIVE_SECS"),
            "MCP_SSE_KEEP_ALIVE_SECS",
            DEFAULT_SSE_KEEP_ALIVE_SECS,
        )?);
        let upstream_timeout = Duration::from_secs(positive(
            value("UPSTREAM_TIMEOUT_SECS"),
            "UPSTREAM_TIMEOUT_SECS",
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?);

        let arxiv_api_base =
            url(value("ARXIV_API_BASE"), "ARXIV_API_BASE", DEFAULT_ARXIV_API_BASE)?;

        let workers_ai = match (value("WORKERS_AI_ACCOUNT_ID"), value("WORKERS_AI_API_TOKEN")) {
            (Some(account_id), Some(api_token)) => Some(WorkersAiSettings {
                base_url: url(
                    value("WORKERS_AI_BASE_URL"),
                    "WORKERS_AI_BASE_URL",
                    DEFAULT_WORKERS_AI_BASE_URL,
                )?,
                account_id,
                api_token,
                model: value("WORKERS_AI_MODEL")
                    .unwrap_or_else(|| DEFAULT_SUMMARY_MODEL.to_string()),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialWorkersAi),
        };

        let summary_max_length = value("SUMMARY_MAX_LENGTH")
            .map(|raw| {
                let length = raw.parse::<u32>().map_err(|_| {
                    ConfigError::InvalidSummaryLength(format!("`{raw}` is not an integer"))
                })?;
                validate_summary_length(Some(length)).map_err(ConfigError::InvalidSummaryLength)?;
                Ok::<_, ConfigError>(length)
            })
            .transpose()?
            .unwrap_or(DEFAULT_SUMMARY_LENGTH);

        let config = Self {
            bind_addr,
            bind_port,
            api_token: value("MCP_API_TOKEN"),
            max_body_bytes,
            batch_concurrency,
            sse_keep_alive,
            arxiv_api_base,
            upstream_timeout,
            workers_ai,
            summary_max_length,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

fn positive<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .ok()
            .filter(|value| *value > T::default())
            .ok_or(ConfigError::InvalidPositive(key)),
    }
}

fn url(raw: Option<String>, key: &'static str, default: &str) -> Result<String, ConfigError> {
    let url = raw.unwrap_or_else(|| default.to_string());
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::InvalidUrl(key))
    }
}
