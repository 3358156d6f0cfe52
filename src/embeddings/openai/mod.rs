
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{Embedder, EmbeddingError};
use crate::config::{ConfigError, OpenAiConfig};
use crate::http::ApiClient;

pub const DEFAULT_BATCH_SIZE: u32 = 512;
/// Output size of text-embedding-3-small
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;

const EMBEDDINGS_PATH: &str = "embeddings";

/// Client for the `/embeddings` endpoint of an OpenAI-compatible API
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: ApiClient,
    model: String,
    batch_size: usize,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: ApiClient::new(config)?,
            model: config.embedding_model.clone(),
            batch_size: config.batch_size.max(1) as usize,
            dimension: config.embedding_dimension as usize,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };

        let response_text = self.client.post_json(EMBEDDINGS_PATH, &request)?;
        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if response.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                sent: texts.len(),
                received: response.data.len(),
            });
        }

        let mut data = response.data;
        data.sort_by_key(|item| item.index);

        data.into_iter()
            .map(|item| {
                if item.embedding.len() == self.dimension {
                    Ok(item.embedding)
                } else {
                    Err(EmbeddingError::DimensionMismatch {
                        expected: self.dimension,
                        actual: item.embedding.len(),
                    })
                }
            })
            .collect()
    }
}

impl Embedder for OpenAiEmbedder {
    /// Embeds in batches of `batch_size`; the first failing batch aborts the call
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_count = texts.len().div_ceil(self.batch_size);
        debug!(
            "Embedding {} texts with {} in {} batches",
            texts.len(),
            self.model,
            batch_count
        );

        let mut embeddings = Vec::with_capacity(texts.len());
        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(
                "Processing embedding batch {}/{} ({} texts)",
                batch_index + 1,
                batch_count,
                batch.len()
            );
            embeddings.extend(self.embed_single_batch(batch)?);
        }

        info!("Generated {} embeddings", embeddings.len());
        Ok(embeddings)
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }
}
