use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] embeddings::chunking::ChunkingError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] embeddings::EmbeddingError),

    #[error("Chat completion error: {0}")]
    Chat(#[from] llm::ChatError),

    #[error("Index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("Citation error: {0}")]
    Citation(#[from] citations::CitationError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] retrieval::RetrievalError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod citations;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod extraction;
pub mod http;
pub mod index;
pub mod indexer;
pub mod llm;
pub mod retrieval;
pub mod tutor;

#[cfg(test)]
pub(crate) mod testing;
