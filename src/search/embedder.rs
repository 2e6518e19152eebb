//! Embedder trait: the one capability every backend provides.
//!
//! A backend turns text into a fixed-dimension vector. The hashed n-gram
//! embedder ([`super::hash_embedder::HashEmbedder`]) is always available; the
//! ONNX backend ([`super::fastembed_embedder::FastEmbedder`]) needs model files
//! on disk and reports [`EmbedderError::Unavailable`] when they are missing so
//! callers can fall back instead of failing the whole query path.
//!
//! Vectors returned by [`Embedder::embed`] are unit length, or all zeros when
//! the text has no content the backend can encode.

use thiserror::Error;

pub type EmbedderResult<T> = Result<T, EmbedderError>;

#[derive(Debug, Error)]
pub enum EmbedderError {
    /// The backend's model or runtime is not present. Recoverable: fall back
    /// to the hashed backend or report to the caller.
    #[error("embedder unavailable: {0}")]
    Unavailable(String),

    /// The backend is loaded but inference failed for this input.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// The backend produced a vector of the wrong width.
    #[error("embedder returned dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedderError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EmbedderError::Unavailable(_))
    }
}

/// Static description of a backend, persisted into the index summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub id: String,
    pub dimension: usize,
    pub is_semantic: bool,
}

/// Text → fixed-dimension unit vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> EmbedderResult<Vec<f32>>;

    /// Embed many texts; backends with a batched runtime override this.
    fn embed_batch(&self, texts: &[&str]) -> EmbedderResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize;

    /// Stable identifier stored with every index built by this backend.
    fn id(&self) -> &str;

    /// Whether the backend is a learned model (vs. lexical hashing).
    fn is_semantic(&self) -> bool;

    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            id: self.id().to_string(),
            dimension: self.dimension(),
            is_semantic: self.is_semantic(),
        }
    }
}
