//! Embedder registry for backend selection.
//!
//! Lists the embedding backends this build knows about, checks whether their
//! model files are present, and constructs them by name.
//!
//! # Supported Embedders
//!
//! | Name | ID | Dimension | Type | Notes |
//! |------|-----|-----------|------|-------|
//! | hash | char_ngram_hash | 256 (configurable) | Hash | Default, always available |
//! | e5-small | fastembed-e5-small | 384 | ML | multilingual-e5-small via ONNX |
//! | e5-base | fastembed-e5-base | 768 | ML | multilingual-e5-base via ONNX |
//!
//! # Example
//!
//! ```ignore
//! use ngram_search::search::embedder_registry::{EmbedderRegistry, get_embedder};
//!
//! let registry = EmbedderRegistry::new(&data_dir);
//! for info in registry.available() {
//!     println!("{}: {} ({})", info.name, info.id, info.dimension);
//! }
//! let embedder = get_embedder(&data_dir, Some("e5-small"), &cfg.embedding)?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::embedder::{Embedder, EmbedderError, EmbedderResult};
use super::fastembed_embedder::FastEmbedder;
use super::hash_embedder::{HASH_EMBEDDER_METHOD, HashEmbedder};
use crate::config::{DEFAULT_DIM, EmbeddingConfig};
use crate::storage::index_store::IndexSummary;

/// Hash embedder name (always available, default).
pub const HASH_EMBEDDER: &str = "hash";

/// Default embedder name when none specified.
pub const DEFAULT_EMBEDDER: &str = HASH_EMBEDDER;

/// Information about a registered embedder.
#[derive(Debug, Clone)]
pub struct RegisteredEmbedder {
    /// Short name for CLI/config (e.g., "hash", "e5-small").
    pub name: &'static str,
    /// Id recorded as the index `method`.
    pub id: &'static str,
    /// Output dimension (hash: the default; the index config decides).
    pub dimension: usize,
    pub is_semantic: bool,
    pub description: &'static str,
    /// Whether the model files are required (false = always available).
    pub requires_model_files: bool,
}

impl RegisteredEmbedder {
    /// Check if this embedder is available in the given data directory.
    pub fn is_available(&self, data_dir: &Path) -> bool {
        self.missing_files(data_dir).is_empty()
    }

    /// Required model files that are absent (empty for the hash backend).
    pub fn missing_files(&self, data_dir: &Path) -> Vec<String> {
        if !self.requires_model_files {
            return Vec::new();
        }
        FastEmbedder::missing_files(data_dir, self.name)
    }

    /// Model cache directory for this embedder (if applicable).
    pub fn model_dir(&self, data_dir: &Path) -> Option<PathBuf> {
        if !self.requires_model_files {
            return None;
        }
        FastEmbedder::model_dir(data_dir, self.name)
    }
}

/// Static registry of all supported embedders.
pub static EMBEDDERS: &[RegisteredEmbedder] = &[
    RegisteredEmbedder {
        name: "hash",
        id: HASH_EMBEDDER_METHOD,
        dimension: DEFAULT_DIM,
        is_semantic: false,
        description: "Character n-gram feature hashing - spelling-variant tolerant, always available",
        requires_model_files: false,
    },
    RegisteredEmbedder {
        name: "e5-small",
        id: "fastembed-e5-small",
        dimension: 384,
        is_semantic: true,
        description: "multilingual-e5-small (ONNX) - dense multilingual embeddings",
        requires_model_files: true,
    },
    RegisteredEmbedder {
        name: "e5-base",
        id: "fastembed-e5-base",
        dimension: 768,
        is_semantic: true,
        description: "multilingual-e5-base (ONNX) - larger, slower, higher quality",
        requires_model_files: true,
    },
];

/// Embedder registry with data directory context.
pub struct EmbedderRegistry {
    data_dir: PathBuf,
}

impl EmbedderRegistry {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
        }
    }

    pub fn all(&self) -> &'static [RegisteredEmbedder] {
        EMBEDDERS
    }

    /// Get only available embedders (model files present).
    pub fn available(&self) -> Vec<&'static RegisteredEmbedder> {
        EMBEDDERS
            .iter()
            .filter(|e| e.is_available(&self.data_dir))
            .collect()
    }

    /// Look up by name or id, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&'static RegisteredEmbedder> {
        let name_lower = name.to_ascii_lowercase();
        EMBEDDERS
            .iter()
            .find(|e| e.name == name_lower || e.id == name_lower)
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.get(name)
            .map(|e| e.is_available(&self.data_dir))
            .unwrap_or(false)
    }

    /// Best available semantic embedder, else hash.
    pub fn best_available(&self) -> &'static RegisteredEmbedder {
        EMBEDDERS
            .iter()
            .filter(|e| e.is_semantic)
            .find(|e| e.is_available(&self.data_dir))
            .unwrap_or(&EMBEDDERS[0])
    }

    /// Validate that an embedder is ready to use.
    pub fn validate(&self, name: &str) -> EmbedderResult<&'static RegisteredEmbedder> {
        let embedder = self.get(name).ok_or_else(|| {
            EmbedderError::Unavailable(format!(
                "unknown embedder '{}'. Available: {}",
                name,
                EMBEDDERS
                    .iter()
                    .map(|e| e.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        let missing = embedder.missing_files(&self.data_dir);
        if !missing.is_empty() {
            let model_dir = embedder
                .model_dir(&self.data_dir)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(EmbedderError::Unavailable(format!(
                "embedder '{name}' not available: missing {} in {model_dir}",
                missing.join(", ")
            )));
        }

        Ok(embedder)
    }
}

/// Load an embedder by name (default: hash).
///
/// The hash backend takes its dimension and n-gram range from `embedding`.
pub fn get_embedder(
    data_dir: &Path,
    name: Option<&str>,
    embedding: &EmbeddingConfig,
) -> EmbedderResult<Arc<dyn Embedder>> {
    let registry = EmbedderRegistry::new(data_dir);
    let info = registry.validate(name.unwrap_or(DEFAULT_EMBEDDER))?;
    load_embedder_by_name(data_dir, info.name, embedding)
}

/// Like [`get_embedder`], but an unavailable model backend degrades to the
/// hash backend with a warning unless `strict` is set. Unknown names are
/// always an error.
pub fn get_embedder_or_hash(
    data_dir: &Path,
    name: Option<&str>,
    embedding: &EmbeddingConfig,
    strict: bool,
) -> EmbedderResult<Arc<dyn Embedder>> {
    let requested = name.unwrap_or(DEFAULT_EMBEDDER);
    let known = EmbedderRegistry::new(data_dir).get(requested).is_some();
    match get_embedder(data_dir, name, embedding) {
        Ok(embedder) => Ok(embedder),
        Err(err) if err.is_unavailable() && known && !strict => {
            tracing::warn!(
                requested,
                error = %err,
                "embedder unavailable; falling back to hash"
            );
            Ok(Arc::new(HashEmbedder::from_config(embedding)))
        }
        Err(err) => Err(err),
    }
}

/// The backend an existing index was built with.
///
/// No fallback: vectors from another backend live in a different space, so
/// an unavailable backend is reported to the caller.
pub fn embedder_for_index(
    data_dir: &Path,
    summary: &IndexSummary,
) -> EmbedderResult<Arc<dyn Embedder>> {
    let cfg = summary.search_config().embedding;
    if summary.is_hash_index() {
        return Ok(Arc::new(HashEmbedder::from_config(&cfg)));
    }
    let embedder = get_embedder(data_dir, Some(&summary.embedding.embedder_id), &cfg)?;
    if embedder.dimension() != cfg.dim {
        return Err(EmbedderError::DimensionMismatch {
            expected: cfg.dim,
            actual: embedder.dimension(),
        });
    }
    Ok(embedder)
}

fn load_embedder_by_name(
    data_dir: &Path,
    name: &str,
    embedding: &EmbeddingConfig,
) -> EmbedderResult<Arc<dyn Embedder>> {
    match name {
        "hash" => Ok(Arc::new(HashEmbedder::from_config(embedding))),
        "e5-small" | "e5-base" => Ok(Arc::new(FastEmbedder::load_by_name(data_dir, name)?)),
        _ => Err(EmbedderError::Unavailable(format!(
            "embedder '{name}' not implemented"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_registry_get_by_name_and_id() {
        let tmp = tempdir().unwrap();
        let registry = EmbedderRegistry::new(tmp.path());

        assert_eq!(registry.get("hash").unwrap().id, HASH_EMBEDDER_METHOD);
        assert_eq!(registry.get("E5-Small").unwrap().dimension, 384);
        assert_eq!(registry.get("char_ngram_hash").unwrap().name, "hash");
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_hash_always_available() {
        let tmp = tempdir().unwrap();
        let registry = EmbedderRegistry::new(tmp.path());
        assert!(registry.is_available("hash"));
        let available = registry.available();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].name, "hash");
    }

    #[test]
    fn test_model_backend_unavailable_without_files() {
        let tmp = tempdir().unwrap();
        let registry = EmbedderRegistry::new(tmp.path());
        assert!(!registry.is_available("e5-small"));
        let err = registry.validate("e5-small").unwrap_err();
        assert!(matches!(err, EmbedderError::Unavailable(_)));
    }

    #[test]
    fn test_empty_model_dir_is_unavailable() {
        let tmp = tempdir().unwrap();
        let dir = FastEmbedder::model_dir(tmp.path(), "e5-small").unwrap();
        std::fs::create_dir_all(dir).unwrap();
        let registry = EmbedderRegistry::new(tmp.path());
        assert!(!registry.is_available("e5-small"));
        assert_eq!(registry.best_available().name, "hash");

        let err = registry.validate("e5-small").unwrap_err();
        assert!(err.to_string().contains("refs/main"), "got: {err}");
    }

    #[test]
    fn test_available_once_snapshot_is_complete() {
        let tmp = tempdir().unwrap();
        crate::search::fastembed_embedder::stage_model_files(tmp.path(), "e5-small");
        let registry = EmbedderRegistry::new(tmp.path());
        assert!(registry.is_available("e5-small"));
        assert!(registry.get("e5-small").unwrap().missing_files(tmp.path()).is_empty());
        assert_eq!(registry.best_available().name, "e5-small");
        assert!(!registry.is_available("e5-base"));
    }

    #[test]
    fn test_best_available_fallback() {
        let tmp = tempdir().unwrap();
        let registry = EmbedderRegistry::new(tmp.path());
        assert_eq!(registry.best_available().name, "hash");
    }

    #[test]
    fn test_get_embedder_uses_config_dimension() {
        let tmp = tempdir().unwrap();
        let cfg = EmbeddingConfig {
            dim: 64,
            ..EmbeddingConfig::default()
        };
        let embedder = get_embedder(tmp.path(), None, &cfg).unwrap();
        assert_eq!(embedder.id(), HASH_EMBEDDER_METHOD);
        assert_eq!(embedder.dimension(), 64);
    }

    #[test]
    fn test_fallback_to_hash_unless_strict() {
        let tmp = tempdir().unwrap();
        let cfg = EmbeddingConfig::default();
        let embedder = get_embedder_or_hash(tmp.path(), Some("e5-base"), &cfg, false).unwrap();
        assert_eq!(embedder.id(), HASH_EMBEDDER_METHOD);

        let err = get_embedder_or_hash(tmp.path(), Some("e5-base"), &cfg, true)
            .err()
            .unwrap();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_unknown_name_is_not_silently_replaced() {
        let tmp = tempdir().unwrap();
        let err = get_embedder_or_hash(
            tmp.path(),
            Some("word2vec"),
            &EmbeddingConfig::default(),
            false,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("unknown embedder"));
    }
}
