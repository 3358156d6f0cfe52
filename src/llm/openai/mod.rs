
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{ChatError, ChatMessage, ChatModel};
use crate::config::{ConfigError, OpenAiConfig};
use crate::http::ApiClient;

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Client for the `/chat/completions` endpoint of an OpenAI-compatible API
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: ApiClient,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatModel {
    /// Client for the configured `chat_model`
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self, ConfigError> {
        Self::for_model(config, &config.chat_model)
    }

    #[inline]
    pub fn for_model(config: &OpenAiConfig, model: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            client: ApiClient::new(config)?,
            model: model.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        })
    }

    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[inline]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ChatModel for OpenAiChatModel {
    #[inline]
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            messages.len()
        );

        let response_text = self.client.post_json(CHAT_COMPLETIONS_PATH, &request)?;
        let response: CompletionResponse = serde_json::from_str(&response_text)
            .map_err(|e| ChatError::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(ChatError::NoChoices)?;

        Ok(choice.message.content.unwrap_or_default().trim().to_string())
    }
}
