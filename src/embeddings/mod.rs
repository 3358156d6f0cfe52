// Embeddings module
// Token-window chunking and the embedding model client

pub mod chunking;
pub mod openai;

use thiserror::Error;

use crate::http::HttpError;

pub use chunking::{
    ChunkingConfig, ChunkingError, TextChunk, TextChunker, Tokenizer, estimate_token_count,
};
pub use openai::OpenAiEmbedder;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("Embedding count mismatch: sent {sent} texts, received {received} vectors")]
    CountMismatch { sent: usize, received: usize },
    #[error("Expected {expected}-dimensional embeddings, received {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Maps text to fixed-length vectors
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn dimension(&self) -> usize;

    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no vector for query".to_string()))
    }
}
