use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Upload read error: {0}")]
    UploadRead(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Index storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("No index available: upload a document first")]
    NoIndexAvailable,

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Embedding model mismatch: index was built with '{expected}', got '{found}'")]
    EmbeddingMismatch { expected: String, found: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Stable machine-readable name of the error class
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UploadRead(_) => "upload_read_error",
            Self::Extraction(_) => "extraction_error",
            Self::EmbeddingService(_) => "embedding_service_error",
            Self::Storage(_) | Self::Io(_) => "io_error",
            Self::NotFound(_) => "not_found",
            Self::Retrieval(_) => "retrieval_error",
            Self::Generation(_) => "generation_error",
            Self::NoIndexAvailable => "no_index_available",
            Self::UnknownSession(_) => "unknown_session",
            Self::EmbeddingMismatch { .. } => "embedding_mismatch",
            Self::Config(_) => "config_error",
            Self::Other(_) => "internal_error",
        }
    }
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod extractor;
pub mod index;
pub mod orchestrator;
pub mod pipeline;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;
