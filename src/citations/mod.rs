// Citation module
// Asks the chat model for one APA 7th-style reference per source document


use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, info};

use crate::index::{ChunkStore, VectorIndex};
use crate::llm::{ChatError, ChatMessage, ChatModel};

/// Leading chunks of each source shown to the model
pub const CITATION_SAMPLE_CHUNKS: usize = 3;

pub const CITATION_SYSTEM_PROMPT: &str = "You are a straightforward assistant who provides quick, direct APA 7th-style citations. \
Use only the provided text chunk. If you cannot generate a citation, respond with 'I do not know'.";

#[derive(Debug, Error)]
pub enum CitationError {
    #[error("Citation request failed: {0}")]
    Chat(#[from] ChatError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCitation {
    pub source_id: String,
    pub citation: String,
}

/// One citation per source, in order of first appearance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationMap {
    entries: Vec<SourceCitation>,
}

impl CitationMap {
    #[inline]
    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.source_id == source_id)
            .map(|entry| entry.citation.as_str())
    }

    #[inline]
    pub fn insert(&mut self, source_id: String, citation: String) {
        match self.entries.iter_mut().find(|e| e.source_id == source_id) {
            Some(entry) => entry.citation = citation,
            None => self.entries.push(SourceCitation {
                source_id,
                citation,
            }),
        }
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &SourceCitation> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup table as `source,citation` lines with a header row
    #[inline]
    pub fn to_csv(&self) -> String {
        std::iter::once("source,citation".to_string())
            .chain(
                self.entries
                    .iter()
                    .map(|e| format!("{},{}", csv_field(&e.source_id), csv_field(&e.citation))),
            )
            .join("\n")
            + "\n"
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub struct CitationGenerator<'a> {
    chat: &'a dyn ChatModel,
}

impl<'a> CitationGenerator<'a> {
    #[inline]
    pub fn new(chat: &'a dyn ChatModel) -> Self {
        Self { chat }
    }

    /// Stores the model's reply verbatim, including an "I do not know" sentinel.
    /// The first failed request aborts the whole pass.
    #[inline]
    pub fn generate(&self, store: &ChunkStore) -> Result<CitationMap, CitationError> {
        let mut citations = CitationMap::default();

        for (source_id, chunks) in store.chunks_by_source() {
            let sample = chunks
                .iter()
                .take(CITATION_SAMPLE_CHUNKS)
                .map(|chunk| chunk.content.as_str())
                .join(" ");

            debug!(
                "Requesting citation for {} from {} sample chunks",
                source_id,
                chunks.len().min(CITATION_SAMPLE_CHUNKS)
            );

            let messages = [
                ChatMessage::system(CITATION_SYSTEM_PROMPT),
                ChatMessage::user(format!("Text chunk: {}", sample)),
            ];
            let citation = self.chat.complete(&messages)?.trim().to_string();

            debug!("Citation for {}: {}", source_id, citation);
            citations.insert(source_id, citation);
        }

        info!("Generated {} citations", citations.len());
        Ok(citations)
    }

    /// Sets `citation` on every chunk whose source has an entry
    #[inline]
    pub fn apply(store: &mut ChunkStore, citations: &CitationMap) {
        for record in store.values_mut() {
            if let Some(citation) = citations.get(&record.source_id) {
                record.citation = Some(citation.to_string());
            }
        }
    }

    /// [`generate`](Self::generate) then [`apply`](Self::apply) on the index's chunks
    #[inline]
    pub fn annotate(&self, index: &mut VectorIndex) -> Result<CitationMap, CitationError> {
        let citations = self.generate(index.records())?;
        Self::apply(index.records_mut(), &citations);
        Ok(citations)
    }
}
