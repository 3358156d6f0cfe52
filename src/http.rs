// HTTP plumbing shared by the embedding and chat clients

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::{ConfigError, OpenAiConfig};

/// Embedding responses for a full 512-text batch run well past ureq's default body limit
const MAX_RESPONSE_BYTES: u64 = 128 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Failed to build URL for {0}")]
    Url(String),
    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Service returned HTTP {0}")]
    Status(u16),
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<ureq::Error> for HttpError {
    #[inline]
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::StatusCode(status) => Self::Status(status),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Blocking JSON client for an OpenAI-compatible API
#[derive(Debug, Clone)]
pub struct ApiClient {
    agent: ureq::Agent,
    base_url: Url,
    api_key: Option<String>,
}

impl ApiClient {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self, ConfigError> {
        let base_url = config.api_url()?;
        Ok(Self {
            agent: build_agent(Duration::from_secs(config.timeout_secs)),
            base_url,
            api_key: config.resolved_api_key(),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// POST a JSON body to `path` (relative to the base URL) and return the raw response text
    #[inline]
    pub fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<String, HttpError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|_| HttpError::Url(path.to_string()))?;
        let request_json = serde_json::to_string(body)?;

        debug!("POST {} ({} bytes)", url, request_json.len());

        let mut request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let text = request
            .send(request_json.as_str())
            .and_then(|mut resp| {
                resp.body_mut()
                    .with_config()
                    .limit(MAX_RESPONSE_BYTES)
                    .read_to_string()
            })?;

        Ok(text)
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
