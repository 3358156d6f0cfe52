// Indexer module
// Builds file and course indexes from stored documents and keeps the stored blobs current


use anyhow::anyhow;
use tracing::{debug, info};

use crate::Result;
use crate::citations::CitationGenerator;
use crate::database::{IndexOwner, IndexRepository, StoredFile};
use crate::embeddings::{Embedder, TextChunker};
use crate::extraction::extract_normalized;
use crate::index::{ChunkRecord, IndexBlobs, IndexError, VectorIndex};
use crate::llm::ChatModel;

/// Raw document handed to the index builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub source_id: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl From<&StoredFile> for SourceDocument {
    #[inline]
    fn from(file: &StoredFile) -> Self {
        Self {
            source_id: file.id.to_string(),
            filename: file.filename.clone(),
            bytes: file.file_data.clone(),
        }
    }
}

/// Extraction, chunking, embedding and the citation pass
pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    chat: &'a dyn ChatModel,
    chunker: TextChunker,
    annotate_citations: bool,
}

impl<'a> IndexBuilder<'a> {
    #[inline]
    pub fn new(embedder: &'a dyn Embedder, chat: &'a dyn ChatModel, chunker: TextChunker) -> Self {
        Self {
            embedder,
            chat,
            chunker,
            annotate_citations: true,
        }
    }

    #[inline]
    pub fn with_citations(mut self, annotate_citations: bool) -> Self {
        self.annotate_citations = annotate_citations;
        self
    }

    /// Chunks keep document order, then chunk order within each document.
    /// Documents without extractable text contribute nothing.
    #[inline]
    pub fn build_from_documents(&self, documents: &[SourceDocument]) -> Result<VectorIndex> {
        let mut records = Vec::new();

        for document in documents {
            let text = extract_normalized(&document.bytes, &document.filename);
            if text.is_empty() {
                info!(
                    "No text extracted from {} (source {}), skipping",
                    document.filename, document.source_id
                );
                continue;
            }

            let chunks = self.chunker.split(&text)?;
            debug!(
                "Chunked {} into {} chunks",
                document.filename,
                chunks.len()
            );

            records.extend(chunks.into_iter().map(|chunk| ChunkRecord {
                content: chunk.content,
                source_id: document.source_id.clone(),
                chunk_index: chunk.chunk_index,
                filename: document.filename.clone(),
                citation: None,
            }));
        }

        let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        let mut index = VectorIndex::build(records, vectors)?;

        if self.annotate_citations && !index.is_empty() {
            CitationGenerator::new(self.chat).annotate(&mut index)?;
        }

        info!(
            "Built index of {} chunks from {} documents",
            index.len(),
            documents.len()
        );
        Ok(index)
    }
}

/// Rebuilds and loads the indexes stored in a repository.
/// Nothing is written unless the whole build succeeds.
pub struct IndexLifecycle<'a, R: IndexRepository> {
    repository: &'a R,
    builder: IndexBuilder<'a>,
}

impl<'a, R: IndexRepository> IndexLifecycle<'a, R> {
    #[inline]
    pub fn new(repository: &'a R, builder: IndexBuilder<'a>) -> Self {
        Self {
            repository,
            builder,
        }
    }

    #[inline]
    pub async fn rebuild_file_index(&self, file_id: i64) -> Result<IndexBlobs> {
        let file = self
            .repository
            .get_file(file_id)
            .await?
            .ok_or_else(|| anyhow!("File {} does not exist", file_id))?;

        info!("Rebuilding index for file {} ({})", file_id, file.filename);
        let index = self
            .builder
            .build_from_documents(&[SourceDocument::from(&file)])?;
        let blobs = index.to_blobs()?;

        self.repository.replace_file_index(file_id, &blobs).await?;
        Ok(blobs)
    }

    /// Always a full rebuild over every file of the course
    #[inline]
    pub async fn rebuild_course_index(&self, course_id: i64) -> Result<IndexBlobs> {
        let files = self.repository.list_course_files(course_id).await?;
        info!(
            "Rebuilding index for course {} from {} files",
            course_id,
            files.len()
        );

        let documents: Vec<SourceDocument> = files.iter().map(SourceDocument::from).collect();
        let index = self.builder.build_from_documents(&documents)?;
        let blobs = index.to_blobs()?;

        self.repository
            .replace_course_index(course_id, &blobs)
            .await?;
        Ok(blobs)
    }

    /// File index first, then the course that contains it
    #[inline]
    pub async fn on_file_changed(&self, file_id: i64) -> Result<()> {
        self.rebuild_file_index(file_id).await?;

        match self.repository.course_id_for_file(file_id).await? {
            Some(course_id) => {
                self.rebuild_course_index(course_id).await?;
            }
            None => debug!("File {} belongs to no course", file_id),
        }
        Ok(())
    }

    #[inline]
    pub async fn load_file_index(&self, file_id: i64) -> Result<VectorIndex> {
        load_index(self.repository, IndexOwner::File(file_id)).await
    }

    #[inline]
    pub async fn load_course_index(&self, course_id: i64) -> Result<VectorIndex> {
        load_index(self.repository, IndexOwner::Course(course_id)).await
    }
}

/// Stored index of a course or file; `NotFound` if it was never built
#[inline]
pub async fn load_index<R: IndexRepository + ?Sized>(
    repository: &R,
    owner: IndexOwner,
) -> Result<VectorIndex> {
    let blobs = match owner {
        IndexOwner::File(id) => repository.file_index(id).await?,
        IndexOwner::Course(id) => repository.course_index(id).await?,
    }
    .ok_or_else(|| IndexError::NotFound(owner.to_string()))?;

    Ok(VectorIndex::from_blobs(&blobs)?)
}
