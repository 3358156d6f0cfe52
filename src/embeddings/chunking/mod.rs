
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

/// A window of consecutive tokens, decoded back to text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    /// Position of this window within the document
    pub chunk_index: usize,
    pub token_count: usize,
}

/// Sliding-window settings, measured in cl100k_base tokens
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    /// Tokens shared by consecutive windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_tokens: 300,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.max_tokens == 0 {
            return Err(ChunkingError::ZeroMaxTokens);
        }
        if self.overlap >= self.max_tokens {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: self.overlap,
                max_tokens: self.max_tokens,
            });
        }
        Ok(())
    }

    /// Distance between the starts of consecutive windows
    #[inline]
    pub fn stride(&self) -> usize {
        self.max_tokens.saturating_sub(self.overlap).max(1)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("max_tokens must be greater than zero")]
    ZeroMaxTokens,
    #[error("overlap ({overlap}) must be smaller than max_tokens ({max_tokens})")]
    OverlapTooLarge { overlap: usize, max_tokens: usize },
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

/// Reversible text <-> token mapping
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    fn decode(&self, tokens: &[u32]) -> Result<String, ChunkingError>;
}

/// OpenAI's cl100k_base byte-pair encoding
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    #[inline]
    pub fn new() -> Result<Self, ChunkingError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| ChunkingError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }
}

impl fmt::Debug for Cl100kTokenizer {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cl100kTokenizer")
    }
}

impl Tokenizer for Cl100kTokenizer {
    #[inline]
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|token| token as u32)
            .collect()
    }

    #[inline]
    fn decode(&self, tokens: &[u32]) -> Result<String, ChunkingError> {
        self.bpe
            .decode(tokens.iter().map(|&token| token as _).collect())
            .map_err(|e| ChunkingError::Tokenizer(e.to_string()))
    }
}

/// Splits text into overlapping token windows
#[derive(Clone)]
pub struct TextChunker {
    config: ChunkingConfig,
    tokenizer: Arc<dyn Tokenizer>,
}

impl fmt::Debug for TextChunker {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextChunker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TextChunker {
    /// Chunker over cl100k_base tokens
    #[inline]
    pub fn new(config: ChunkingConfig) -> Result<Self, ChunkingError> {
        Self::with_tokenizer(config, Arc::new(Cl100kTokenizer::new()?))
    }

    #[inline]
    pub fn with_tokenizer(
        config: ChunkingConfig,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self, ChunkingError> {
        config.validate()?;
        Ok(Self { config, tokenizer })
    }

    #[inline]
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Token ranges covered by each window for a document of `token_count` tokens.
    /// Every window starts `stride` tokens after the previous one and the last
    /// window may be shorter than `max_tokens`.
    #[inline]
    pub fn token_windows(&self, token_count: usize) -> Vec<Range<usize>> {
        let stride = self.config.stride();
        (0..token_count)
            .step_by(stride)
            .map(|start| start..(start + self.config.max_tokens).min(token_count))
            .collect()
    }

    /// Split text into windows, in document order
    #[inline]
    pub fn split(&self, text: &str) -> Result<Vec<TextChunk>, ChunkingError> {
        let tokens = self.tokenizer.encode(text);

        let chunks: Vec<TextChunk> = self
            .token_windows(tokens.len())
            .into_iter()
            .filter_map(|range| {
                let token_count = range.len();
                self.decode_window(&tokens, range)
                    .map(|content| (content, token_count))
            })
            .enumerate()
            .map(|(chunk_index, (content, token_count))| TextChunk {
                content,
                chunk_index,
                token_count,
            })
            .collect();

        debug!(
            "Split {} tokens into {} chunks (max {}, overlap {})",
            tokens.len(),
            chunks.len(),
            self.config.max_tokens,
            self.config.overlap
        );

        Ok(chunks)
    }

    /// Decode `tokens[range]`. A window that cuts a multi-byte character is
    /// first shrunk, then widened, by up to three edge tokens.
    fn decode_window(&self, tokens: &[u32], range: Range<usize>) -> Option<String> {
        const MAX_EDGE: usize = 3;

        if let Ok(text) = self.tokenizer.decode(&tokens[range.clone()]) {
            return Some(text);
        }

        for trim_start in 0..=MAX_EDGE {
            for trim_end in 0..=MAX_EDGE {
                if trim_start + trim_end == 0 || trim_start + trim_end >= range.len() {
                    continue;
                }
                let window = &tokens[range.start + trim_start..range.end - trim_end];
                if let Ok(text) = self.tokenizer.decode(window) {
                    return Some(text);
                }
            }
        }

        for grow_start in 0..=MAX_EDGE {
            for grow_end in 0..=MAX_EDGE {
                if grow_start + grow_end == 0 {
                    continue;
                }
                let start = range.start.saturating_sub(grow_start);
                let end = (range.end + grow_end).min(tokens.len());
                if let Ok(text) = self.tokenizer.decode(&tokens[start..end]) {
                    return Some(text);
                }
            }
        }

        warn!(
            "Dropping undecodable window of {} tokens at {}",
            range.len(),
            range.start
        );
        None
    }
}

/// Rough token estimate for display purposes; chunking uses the real tokenizer
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // 1 token ≈ 0.75 words for English text, plus some for punctuation
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
