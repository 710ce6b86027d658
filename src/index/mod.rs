//! Vector index over the chunks of one document
//!
//! Similarity is exact cosine over every stored vector. Ranking uses a stable
//! sort, so chunks with equal scores come back in insertion order and the
//! same query against the same index always yields the same result.


pub mod lancedb;

pub use self::lancedb::{IndexManifest, IndexStore};

use tracing::{debug, info};

use crate::embeddings::{DocumentChunk, Embedder};
use crate::{RagError, Result};

/// A chunk paired with the embedding it was indexed under
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

/// A retrieved chunk with its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Searchable collection of chunk embeddings, tagged with the model that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    embedding_model: String,
    dimension: usize,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Embed every chunk and index the result.
    ///
    /// Nothing is indexed unless every chunk was embedded.
    #[inline]
    pub fn build(chunks: Vec<DocumentChunk>, embedder: &dyn Embedder) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::Extraction(
                "Document produced no text to index".to_string(),
            ));
        }

        debug!(
            "Embedding {} chunks with {}",
            chunks.len(),
            embedder.model_id()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed(&texts)?;

        if vectors.len() != chunks.len() {
            return Err(RagError::EmbeddingService(format!(
                "Expected {} embeddings, received {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk { chunk, vector })
            .collect();

        let index = Self::from_entries(embedder.model_id(), entries)
            .map_err(|e| RagError::EmbeddingService(e.to_string()))?;

        info!(
            "Built index of {} chunks ({} dimensions, model {})",
            index.len(),
            index.dimension,
            index.embedding_model
        );
        Ok(index)
    }

    /// Assemble an index from already-embedded chunks, checking every vector
    /// has the same non-zero dimension
    #[inline]
    pub fn from_entries(embedding_model: &str, entries: Vec<IndexedChunk>) -> Result<Self> {
        let dimension = entries.first().map_or(0, |e| e.vector.len());
        if dimension == 0 {
            return Err(RagError::Storage(
                "Index needs at least one non-empty vector".to_string(),
            ));
        }

        if let Some(position) = entries.iter().position(|e| e.vector.len() != dimension) {
            return Err(RagError::Storage(format!(
                "Vector {} has {} dimensions, expected {}",
                position,
                entries[position].vector.len(),
                dimension
            )));
        }

        Ok(Self {
            embedding_model: embedding_model.to_string(),
            dimension,
            entries,
        })
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    /// Embed `query` and return the `k` nearest chunks, most similar first.
    ///
    /// Returns fewer than `k` only when the index holds fewer chunks.
    #[inline]
    pub fn retrieve(
        &self,
        query: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ScoredChunk>> {
        if embedder.model_id() != self.embedding_model {
            return Err(RagError::EmbeddingMismatch {
                expected: self.embedding_model.clone(),
                found: embedder.model_id().to_string(),
            });
        }

        let query_vector = embedder
            .embed_one(query)
            .map_err(|e| RagError::Retrieval(format!("Failed to embed query: {}", e)))?;

        if query_vector.len() != self.dimension {
            return Err(RagError::Retrieval(format!(
                "Query embedding has {} dimensions, index has {}",
                query_vector.len(),
                self.dimension
            )));
        }

        Ok(self.search(&query_vector, k))
    }

    /// Rank stored chunks against an already-embedded query
    #[inline]
    pub fn search(&self, query_vector: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(query_vector, &entry.vector)))
            .collect();

        // sort_by is stable: equal scores stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }
}

/// Cosine similarity; zero vectors are similar to nothing
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
