//! FastEmbed-backed multilingual embedder (ONNX runtime).
//!
//! Models are resolved from `<data_dir>/models`, the same cache directory
//! fastembed uses for downloads. Loading never fetches anything: unless the
//! hf-hub snapshot named by `refs/main` holds every file in
//! [`REQUIRED_MODEL_FILES`], the constructor returns
//! [`EmbedderError::Unavailable`] and the caller falls back to the hashed
//! backend.

use std::path::{Path, PathBuf};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

use super::embedder::{Embedder, EmbedderError, EmbedderResult};
use super::vector::l2_normalize;

/// Files a model snapshot must contain, relative to `snapshots/<revision>/`.
pub const REQUIRED_MODEL_FILES: &[&str] = &[
    "onnx/model.onnx",
    "tokenizer.json",
    "config.json",
    "special_tokens_map.json",
    "tokenizer_config.json",
];

/// Revision pointer inside a model cache directory.
pub const MODEL_REVISION_REF: &str = "refs/main";

/// ONNX session. fastembed needs exclusive access during inference.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    id: String,
    dimension: usize,
    /// E5 role prefix, applied to documents and queries alike.
    prefix: &'static str,
}

impl FastEmbedder {
    /// fastembed model enum, output dimension and cache directory name for a
    /// registry name.
    fn resolve(name: &str) -> Option<(EmbeddingModel, usize, &'static str)> {
        match name {
            "e5-small" => Some((
                EmbeddingModel::MultilingualE5Small,
                384,
                "models--intfloat--multilingual-e5-small",
            )),
            "e5-base" => Some((
                EmbeddingModel::MultilingualE5Base,
                768,
                "models--intfloat--multilingual-e5-base",
            )),
            _ => None,
        }
    }

    /// Cache directory a model must occupy before it can be loaded.
    pub fn model_dir(data_dir: &Path, name: &str) -> Option<PathBuf> {
        Self::resolve(name).map(|(_, _, dir)| models_dir(data_dir).join(dir))
    }

    /// Snapshot directory `refs/main` points at, if the pointer is readable.
    pub fn snapshot_dir(data_dir: &Path, name: &str) -> Option<PathBuf> {
        let model_dir = Self::model_dir(data_dir, name)?;
        let revision = std::fs::read_to_string(model_dir.join(MODEL_REVISION_REF)).ok()?;
        let revision = revision.trim();
        if revision.is_empty() || revision.contains(['/', '\\']) || revision == ".." {
            return None;
        }
        Some(model_dir.join("snapshots").join(revision))
    }

    /// Required files that are absent for `name`. Empty means loadable.
    ///
    /// Without a readable revision pointer nothing in the snapshot can be
    /// located, so only the pointer itself is reported.
    pub fn missing_files(data_dir: &Path, name: &str) -> Vec<String> {
        if Self::resolve(name).is_none() {
            return Vec::new();
        }
        let Some(snapshot) = Self::snapshot_dir(data_dir, name) else {
            return vec![MODEL_REVISION_REF.to_string()];
        };
        REQUIRED_MODEL_FILES
            .iter()
            .filter(|file| !snapshot.join(file).is_file())
            .map(|file| (*file).to_string())
            .collect()
    }

    pub fn load_by_name(data_dir: &Path, name: &str) -> EmbedderResult<Self> {
        let (model, dimension, dir_name) = Self::resolve(name)
            .ok_or_else(|| EmbedderError::Unavailable(format!("unknown model backend '{name}'")))?;
        let cache_dir = models_dir(data_dir);
        let missing = Self::missing_files(data_dir, name);
        if !missing.is_empty() {
            return Err(EmbedderError::Unavailable(format!(
                "model files for '{name}' missing from {}: {}",
                cache_dir.join(dir_name).display(),
                missing.join(", ")
            )));
        }

        let options = InitOptions::new(model)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);
        let session = TextEmbedding::try_new(options)
            .map_err(|e| EmbedderError::Unavailable(format!("failed to load '{name}': {e}")))?;
        tracing::info!(model = name, dimension, "loaded ONNX embedder");

        Ok(Self {
            model: Mutex::new(session),
            id: format!("fastembed-{name}"),
            dimension,
            prefix: "query: ",
        })
    }
}

fn models_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("models")
}

/// Lay out an hf-hub snapshot for `name` with empty placeholder files.
#[cfg(test)]
pub(crate) fn stage_model_files(data_dir: &Path, name: &str) -> PathBuf {
    let model_dir = FastEmbedder::model_dir(data_dir, name).expect("known model");
    let snapshot = model_dir.join("snapshots").join("0123abcd");
    for file in REQUIRED_MODEL_FILES {
        let path = snapshot.join(file);
        std::fs::create_dir_all(path.parent().expect("parent")).unwrap();
        std::fs::write(path, b"").unwrap();
    }
    std::fs::create_dir_all(model_dir.join("refs")).unwrap();
    std::fs::write(model_dir.join(MODEL_REVISION_REF), "0123abcd").unwrap();
    snapshot
}

impl Embedder for FastEmbedder {
    fn embed(&self, text: &str) -> EmbedderResult<Vec<f32>> {
        let mut batch = self.embed_batch(&[text])?;
        batch
            .pop()
            .ok_or_else(|| EmbedderError::EmbeddingFailed("empty embedding result".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> EmbedderResult<Vec<Vec<f32>>> {
        // Whitespace-only input has nothing to encode.
        let inputs: Vec<String> = texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| format!("{}{t}", self.prefix))
            .collect();
        let mut encoded = if inputs.is_empty() {
            Vec::new()
        } else {
            #[allow(unused_mut)]
            let mut model = self.model.lock();
            model
                .embed(inputs, None)
                .map_err(|e| EmbedderError::EmbeddingFailed(e.to_string()))?
        }
        .into_iter();

        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            if text.trim().is_empty() {
                out.push(vec![0.0; self.dimension]);
                continue;
            }
            let mut vector = encoded.next().ok_or_else(|| {
                EmbedderError::EmbeddingFailed("backend returned fewer vectors than inputs".into())
            })?;
            if vector.len() != self.dimension {
                return Err(EmbedderError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
            l2_normalize(&mut vector);
            out.push(vector);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn is_semantic(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_model_is_unavailable() {
        let tmp = tempdir().unwrap();
        let err = FastEmbedder::load_by_name(tmp.path(), "e5-small")
            .err()
            .expect("no model files present");
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("e5-small"));
        assert!(err.to_string().contains(MODEL_REVISION_REF));
    }

    #[test]
    fn test_empty_model_dir_reports_every_required_file() {
        let tmp = tempdir().unwrap();
        let model_dir = FastEmbedder::model_dir(tmp.path(), "e5-small").unwrap();
        std::fs::create_dir_all(model_dir.join("refs")).unwrap();
        std::fs::write(model_dir.join(MODEL_REVISION_REF), "deadbeef\n").unwrap();

        let missing = FastEmbedder::missing_files(tmp.path(), "e5-small");
        assert_eq!(missing, REQUIRED_MODEL_FILES);

        let err = FastEmbedder::load_by_name(tmp.path(), "e5-small")
            .err()
            .expect("snapshot is empty");
        assert!(err.is_unavailable());
        let message = err.to_string();
        for file in REQUIRED_MODEL_FILES {
            assert!(message.contains(file), "{file} not named in: {message}");
        }
    }

    #[test]
    fn test_partial_snapshot_names_only_absent_files() {
        let tmp = tempdir().unwrap();
        let snapshot = stage_model_files(tmp.path(), "e5-base");
        std::fs::remove_file(snapshot.join("onnx/model.onnx")).unwrap();
        std::fs::remove_file(snapshot.join("tokenizer.json")).unwrap();
        assert_eq!(
            FastEmbedder::missing_files(tmp.path(), "e5-base"),
            vec!["onnx/model.onnx", "tokenizer.json"]
        );
    }

    #[test]
    fn test_complete_snapshot_has_no_missing_files() {
        let tmp = tempdir().unwrap();
        let snapshot = stage_model_files(tmp.path(), "e5-small");
        assert_eq!(
            FastEmbedder::snapshot_dir(tmp.path(), "e5-small"),
            Some(snapshot)
        );
        assert!(FastEmbedder::missing_files(tmp.path(), "e5-small").is_empty());
    }

    #[test]
    fn test_unknown_model_is_unavailable() {
        let tmp = tempdir().unwrap();
        let err = FastEmbedder::load_by_name(tmp.path(), "bogus").err().unwrap();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_model_dir_layout() {
        let dir = FastEmbedder::model_dir(Path::new("/data"), "e5-base").unwrap();
        assert_eq!(
            dir,
            Path::new("/data/models/models--intfloat--multilingual-e5-base")
        );
        assert!(FastEmbedder::model_dir(Path::new("/data"), "hash").is_none());
    }
}
