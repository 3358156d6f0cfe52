// Vector index module
// Pairs a flat L2 index with per-position chunk metadata


pub mod flat;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

pub use flat::{FlatL2Index, SearchHit};

/// Dimension recorded for an index built from zero chunks
pub const EMPTY_INDEX_DIMENSION: usize = 1;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("No index stored for {0}")]
    NotFound(String),
    #[error("Stored index is corrupt: {0}")]
    Corrupt(String),
    #[error("Index holds {vectors} vectors but {records} metadata records")]
    CardinalityMismatch { vectors: usize, records: usize },
    #[error("Expected {expected}-dimensional vector, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Metadata kept for every indexed chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub content: String,
    /// Identity of the document the chunk came from
    pub source_id: String,
    pub chunk_index: usize,
    pub filename: String,
    #[serde(default)]
    pub citation: Option<String>,
}

impl ChunkRecord {
    /// Citation when one was generated, else the filename
    #[inline]
    pub fn display_source(&self) -> &str {
        self.citation.as_deref().unwrap_or(&self.filename)
    }
}

/// Chunk metadata keyed by index position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkStore {
    records: BTreeMap<usize, ChunkRecord>,
}

impl ChunkStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Positions assigned in iteration order, starting at 0
    #[inline]
    pub fn from_records(records: impl IntoIterator<Item = ChunkRecord>) -> Self {
        Self {
            records: records.into_iter().enumerate().collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn get(&self, position: usize) -> Option<&ChunkRecord> {
        self.records.get(&position)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ChunkRecord)> {
        self.records.iter().map(|(position, record)| (*position, record))
    }

    #[inline]
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut ChunkRecord> {
        self.records.values_mut()
    }

    /// Chunks grouped by `source_id` in order of first appearance,
    /// each group sorted by `chunk_index`
    #[inline]
    pub fn chunks_by_source(&self) -> Vec<(String, Vec<&ChunkRecord>)> {
        let mut groups: Vec<(String, Vec<&ChunkRecord>)> = Vec::new();
        for record in self.records.values() {
            match groups.iter_mut().find(|(id, _)| *id == record.source_id) {
                Some((_, chunks)) => chunks.push(record),
                None => groups.push((record.source_id.clone(), vec![record])),
            }
        }
        for (_, chunks) in &mut groups {
            chunks.sort_by_key(|record| record.chunk_index);
        }
        groups
    }

    fn has_contiguous_positions(&self) -> bool {
        self.records.keys().enumerate().all(|(i, position)| i == *position)
    }
}

/// Serialized form of an index: vector blob plus metadata blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBlobs {
    pub index: Vec<u8>,
    pub metadata: Vec<u8>,
}

/// Searchable chunks of one file or one course
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    flat: FlatL2Index,
    records: ChunkStore,
}

impl VectorIndex {
    /// One vector per record, in the same order
    #[inline]
    pub fn build(records: Vec<ChunkRecord>, vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if records.len() != vectors.len() {
            return Err(IndexError::CardinalityMismatch {
                vectors: vectors.len(),
                records: records.len(),
            });
        }

        let dimension = vectors
            .first()
            .map_or(EMPTY_INDEX_DIMENSION, Vec::len);
        if dimension == 0 {
            return Err(IndexError::DimensionMismatch {
                expected: EMPTY_INDEX_DIMENSION,
                actual: 0,
            });
        }

        let mut flat = FlatL2Index::new(dimension);
        for vector in &vectors {
            flat.add(vector)?;
        }

        debug!(
            "Built index with {} vectors of dimension {}",
            flat.len(),
            dimension
        );

        Ok(Self {
            flat,
            records: ChunkStore::from_records(records),
        })
    }

    #[inline]
    pub fn empty() -> Self {
        Self {
            flat: FlatL2Index::new(EMPTY_INDEX_DIMENSION),
            records: ChunkStore::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.flat.dimension()
    }

    #[inline]
    pub fn records(&self) -> &ChunkStore {
        &self.records
    }

    #[inline]
    pub fn records_mut(&mut self) -> &mut ChunkStore {
        &mut self.records
    }

    #[inline]
    pub fn chunks_by_source(&self) -> Vec<(String, Vec<&ChunkRecord>)> {
        self.records.chunks_by_source()
    }

    /// `k` nearest chunks; an empty index returns nothing for any query
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.flat.search(query, k.min(self.len()))
    }

    #[inline]
    pub fn to_blobs(&self) -> Result<IndexBlobs, IndexError> {
        let metadata = serde_json::to_vec(&self.records)
            .map_err(|e| IndexError::Corrupt(format!("unserializable metadata: {}", e)))?;
        let index = self.flat.to_bytes();

        debug!(
            "Serialized index: {} bytes of vectors, {} bytes of metadata",
            index.len(),
            metadata.len()
        );

        Ok(IndexBlobs { index, metadata })
    }

    #[inline]
    pub fn from_blobs(blobs: &IndexBlobs) -> Result<Self, IndexError> {
        let flat = FlatL2Index::from_bytes(&blobs.index)?;
        let records: ChunkStore = serde_json::from_slice(&blobs.metadata)
            .map_err(|e| IndexError::Corrupt(format!("unreadable metadata: {}", e)))?;

        if flat.len() != records.len() {
            return Err(IndexError::CardinalityMismatch {
                vectors: flat.len(),
                records: records.len(),
            });
        }
        if !records.has_contiguous_positions() {
            return Err(IndexError::Corrupt(
                "metadata positions are not contiguous".to_string(),
            ));
        }

        Ok(Self { flat, records })
    }
}
