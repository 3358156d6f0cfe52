// Retrieval module
// Cascading retrieval with a general-knowledge fallback, then stuffed-context QA

#[cfg(test)]
mod tests;

use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::embeddings::{Embedder, EmbeddingError};
use crate::index::{IndexError, VectorIndex};
use crate::llm::{ChatError, ChatMessage, ChatModel};

/// First sentences that mean the model could not answer
pub const UNKNOWN_ANSWER_PHRASES: [&str; 5] = [
    "i don't know",
    "i do not know",
    "unknown",
    "i'm not sure",
    "i am not sure",
];

pub const DEFAULT_FALLBACK_LABEL: &str = "general-knowledge";

const QA_SYSTEM_PROMPT: &str = "Use the following pieces of context to answer the user's question. \n\
If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
----------------\n";

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Chat model request failed: {0}")]
    Chat(#[from] ChatError),
    #[error("Index search failed: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub top_k: usize,
    /// Fewer retrieved chunks than this triggers the fallback
    pub threshold: usize,
    pub include_sources: bool,
}

impl Default for QueryOptions {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 5,
            threshold: 2,
            include_sources: false,
        }
    }
}

impl From<&RetrievalConfig> for QueryOptions {
    #[inline]
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            threshold: config.threshold,
            include_sources: config.include_sources,
        }
    }
}

/// A piece of text placed in the answer prompt
#[derive(Debug, Clone, PartialEq)]
pub struct ContextChunk {
    pub content: String,
    /// Citation, filename or the fallback label
    pub source: String,
    /// Index position and distance; `None` for the fallback answer
    pub hit: Option<(usize, f32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOutcome {
    pub chunks: Vec<ContextChunk>,
    pub fell_back: bool,
}

impl RetrievalOutcome {
    /// Distinct sources in first-occurrence order
    #[inline]
    pub fn sources(&self) -> Vec<String> {
        self.chunks
            .iter()
            .map(|chunk| chunk.source.clone())
            .unique()
            .collect()
    }
}

/// A source listed in a course or file index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitedSource {
    pub source_id: String,
    pub filename: String,
    pub citation: Option<String>,
}

pub struct QaEngine<'a> {
    embedder: &'a dyn Embedder,
    chat: &'a dyn ChatModel,
    fallback_label: String,
}

impl<'a> QaEngine<'a> {
    #[inline]
    pub fn new(embedder: &'a dyn Embedder, chat: &'a dyn ChatModel) -> Self {
        Self {
            embedder,
            chat,
            fallback_label: DEFAULT_FALLBACK_LABEL.to_string(),
        }
    }

    #[inline]
    pub fn with_fallback_label(mut self, label: impl Into<String>) -> Self {
        self.fallback_label = label.into();
        self
    }

    /// Nearest chunks, plus a general-knowledge answer when fewer than
    /// `threshold` chunks come back
    #[inline]
    pub fn retrieve(
        &self,
        index: &VectorIndex,
        query: &str,
        options: &QueryOptions,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        let query_vector = self.embedder.embed_query(query)?;
        let hits = index.search(&query_vector, options.top_k)?;

        let mut chunks: Vec<ContextChunk> = hits
            .iter()
            .filter_map(|hit| {
                index.records().get(hit.position).map(|record| ContextChunk {
                    content: record.content.clone(),
                    source: record.display_source().to_string(),
                    hit: Some((hit.position, hit.distance)),
                })
            })
            .collect();

        debug!(
            "Retrieved {} chunks for query (top_k {}, threshold {})",
            chunks.len(),
            options.top_k,
            options.threshold
        );

        let fell_back = chunks.len() < options.threshold;
        if fell_back {
            info!(
                "Retrieval weak ({} < {}), falling back to general knowledge",
                chunks.len(),
                options.threshold
            );
            let general = self.chat.complete(&[ChatMessage::user(query)])?;
            chunks.push(ContextChunk {
                content: general,
                source: self.fallback_label.clone(),
                hit: None,
            });
        }

        Ok(RetrievalOutcome { chunks, fell_back })
    }

    /// Answer from a retrieval outcome, with a sources section when requested
    #[inline]
    pub fn compose_answer(
        &self,
        outcome: &RetrievalOutcome,
        query: &str,
        include_sources: bool,
    ) -> Result<String, RetrievalError> {
        let contexts = outcome.chunks.iter().map(|chunk| chunk.content.as_str());
        let raw = self.stuffed_completion(contexts, query)?;
        let sources = include_sources.then(|| outcome.sources());
        Ok(postprocess_answer(&raw, sources.as_deref()))
    }

    #[inline]
    pub fn answer(
        &self,
        index: &VectorIndex,
        query: &str,
        options: &QueryOptions,
    ) -> Result<String, RetrievalError> {
        let outcome = self.retrieve(index, query, options)?;
        self.compose_answer(&outcome, query, options.include_sources)
    }

    /// Every chunk of the index goes into the prompt; no fallback, no sources
    #[inline]
    pub fn answer_all_chunks(
        &self,
        index: &VectorIndex,
        query: &str,
    ) -> Result<String, RetrievalError> {
        debug!("Answering with all {} chunks", index.len());
        let raw = self.stuffed_completion(
            index.records().iter().map(|(_, record)| record.content.as_str()),
            query,
        )?;
        Ok(postprocess_answer(&raw, None))
    }

    fn stuffed_completion<'c>(
        &self,
        mut contexts: impl Iterator<Item = &'c str>,
        query: &str,
    ) -> Result<String, RetrievalError> {
        let context = contexts.join("\n\n");
        let messages = [
            ChatMessage::system(format!("{}{}", QA_SYSTEM_PROMPT, context)),
            ChatMessage::user(query),
        ];
        Ok(self.chat.complete(&messages)?)
    }
}

/// Map "I don't know"-style answers to a sentinel, otherwise append sources
#[inline]
pub fn postprocess_answer(raw: &str, sources: Option<&[String]>) -> String {
    let lowered = raw.trim().to_lowercase();
    let first_sentence = lowered.split('.').next().unwrap_or_default();

    if UNKNOWN_ANSWER_PHRASES.contains(&first_sentence) {
        return capitalize(first_sentence);
    }

    let mut answer = raw.to_string();
    if let Some(sources) = sources {
        answer.push_str("\nSources:");
        for source in sources.iter().unique() {
            answer.push_str("\n \n");
            answer.push_str(source);
        }
    }
    answer
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Distinct sources of an index in position order
#[inline]
pub fn list_citations(index: &VectorIndex) -> Vec<CitedSource> {
    index
        .records()
        .iter()
        .map(|(_, record)| record)
        .unique_by(|record| record.source_id.as_str())
        .map(|record| CitedSource {
            source_id: record.source_id.clone(),
            filename: record.filename.clone(),
            citation: record.citation.clone(),
        })
        .collect()
}
