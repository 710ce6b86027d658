// Embeddings module
// Chunking of document text and the embedding service seam

pub mod chunking;
pub mod ollama;

pub use chunking::{ChunkingConfig, DocumentChunk, SourceMetadata, split_pages, split_text};
pub use ollama::OllamaClient;

use crate::Result;

/// Maps text to fixed-dimensional vectors.
///
/// `model_id` names the embedding function. Vectors from different ids live
/// in different spaces and must never be compared with each other.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    /// Embed every text, returning one vector per input in the same order
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    #[inline]
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .pop()
            .ok_or_else(|| crate::RagError::EmbeddingService("Empty embedding response".to_string()))
    }
}
