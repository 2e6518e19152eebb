//! On-disk index generations and the in-memory [`SearchIndex`].
//!
//! # Layout
//!
//! ```text
//! <index_dir>/
//!   CURRENT                      name of the published generation
//!   generations/<generation>/
//!     docs.jsonl                 DocumentMeta per line
//!     doc_embeddings.jsonl       DocEmbedding per line
//!     vocab.jsonl                VocabEntry per line (hash indexes only)
//!     index_meta.json            IndexSummary
//! ```
//!
//! A build writes a complete generation into a staging directory beside the
//! published ones, renames it into place, and only then swaps `CURRENT`
//! (temp file + rename). Readers therefore see either the previous index or the
//! new one, never a half-written mix. A directory that holds the four artifact
//! files directly (no `CURRENT`) is also accepted.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::jsonl::{read_json, read_jsonl, write_json, write_jsonl};
use crate::config::{EmbeddingConfig, ExpansionConfig, SearchConfig};
use crate::model::types::{DocEmbedding, DocumentMeta};
use crate::search::hash_embedder::HASH_EMBEDDER_METHOD;
use crate::search::vocabulary::{VocabEntry, Vocabulary};

pub const DOCS_FILE: &str = "docs.jsonl";
pub const DOC_EMBEDDINGS_FILE: &str = "doc_embeddings.jsonl";
pub const VOCAB_FILE: &str = "vocab.jsonl";
pub const SUMMARY_FILE: &str = "index_meta.json";
pub const CURRENT_FILE: &str = "CURRENT";
pub const GENERATIONS_DIR: &str = "generations";

/// Published generations kept besides the current one.
const RETAINED_PREVIOUS_GENERATIONS: usize = 1;

/// `embedding` section of `index_meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSummary {
    /// Backend id the vectors were produced with.
    pub method: String,
    /// Registry name used to reload that backend at query time.
    #[serde(default = "default_embedder_id")]
    pub embedder_id: String,
    pub dim: usize,
    pub ngram_min: usize,
    pub ngram_max: usize,
    pub min_df: usize,
    /// Size of the stopword list in effect.
    pub stopwords: usize,
    pub decimals: u32,
}

fn default_embedder_id() -> String {
    "hash".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCounts {
    pub docs: usize,
    pub vocab: usize,
}

/// `index_meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub generated_on: DateTime<Utc>,
    #[serde(default)]
    pub generation: String,
    pub embedding: EmbeddingSummary,
    #[serde(default)]
    pub query_expansion: ExpansionConfig,
    pub counts: IndexCounts,
}

impl IndexSummary {
    pub fn is_hash_index(&self) -> bool {
        self.embedding.method == HASH_EMBEDDER_METHOD
    }

    /// Configuration the index was built with.
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            embedding: EmbeddingConfig {
                dim: self.embedding.dim,
                ngram_min: self.embedding.ngram_min,
                ngram_max: self.embedding.ngram_max,
                min_df: self.embedding.min_df,
                decimals: self.embedding.decimals,
            },
            expansion: self.query_expansion.clone(),
        }
    }
}

/// Everything a build produces, ready to publish.
pub struct IndexArtifacts<'a> {
    pub summary: &'a IndexSummary,
    pub docs: &'a [DocumentMeta],
    pub embeddings: &'a [DocEmbedding],
    pub vocab: &'a [VocabEntry],
}

/// Write `artifacts` as a new generation under `index_dir` and make it current.
///
/// Returns the published generation directory.
pub fn publish_generation(index_dir: &Path, artifacts: &IndexArtifacts<'_>) -> Result<PathBuf> {
    let generations = index_dir.join(GENERATIONS_DIR);
    fs::create_dir_all(&generations)
        .with_context(|| format!("create index directory {}", generations.display()))?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(&generations)
        .with_context(|| format!("create staging directory in {}", generations.display()))?;
    write_artifacts(staging.path(), artifacts)?;

    let target = unique_generation_dir(&generations, &artifacts.summary.generation);
    let staged = staging.keep();
    if let Err(err) = fs::rename(&staged, &target) {
        let _ = fs::remove_dir_all(&staged);
        return Err(err).with_context(|| format!("rename staged index to {}", target.display()));
    }
    sync_dir(&generations).context("fsync generations directory")?;

    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .context("generation directory name is not UTF-8")?;
    write_current(index_dir, name)?;
    tracing::info!(generation = name, path = %target.display(), "published index generation");

    if let Err(err) = prune_generations(index_dir, name) {
        tracing::warn!(error = %err, "failed to prune old index generations");
    }
    Ok(target)
}

fn write_artifacts(dir: &Path, artifacts: &IndexArtifacts<'_>) -> Result<()> {
    write_jsonl(&dir.join(DOCS_FILE), artifacts.docs)?;
    write_jsonl(&dir.join(DOC_EMBEDDINGS_FILE), artifacts.embeddings)?;
    write_jsonl(&dir.join(VOCAB_FILE), artifacts.vocab)?;
    // Summary last: a directory with index_meta.json is complete.
    write_json(&dir.join(SUMMARY_FILE), artifacts.summary)?;
    sync_dir(dir).context("fsync staged index directory")?;
    Ok(())
}

fn unique_generation_dir(generations: &Path, name: &str) -> PathBuf {
    let base = if name.is_empty() { "generation" } else { name };
    let mut candidate = generations.join(base);
    let mut n = 1;
    while candidate.exists() {
        candidate = generations.join(format!("{base}-{n}"));
        n += 1;
    }
    candidate
}

fn write_current(index_dir: &Path, generation: &str) -> Result<()> {
    let path = index_dir.join(CURRENT_FILE);
    let temp_path = index_dir.join(format!("{CURRENT_FILE}.tmp"));
    let mut file = File::create(&temp_path)
        .with_context(|| format!("create temp pointer {}", temp_path.display()))?;
    std::io::Write::write_all(&mut file, format!("{generation}\n").as_bytes())?;
    file.sync_all().context("fsync CURRENT temp file")?;
    fs::rename(&temp_path, &path)
        .with_context(|| format!("rename CURRENT temp file {}", temp_path.display()))?;
    sync_dir(index_dir).context("fsync index directory post-rename")?;
    Ok(())
}

/// Name of the generation `CURRENT` points at, if any.
pub fn current_generation(index_dir: &Path) -> Result<Option<String>> {
    let path = index_dir.join(CURRENT_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let name = raw.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        bail!("{} holds an invalid generation name {name:?}", path.display());
    }
    Ok(Some(name.to_string()))
}

/// Directory holding the artifacts of the published index.
pub fn resolve_index_dir(index_dir: &Path) -> Result<PathBuf> {
    if let Some(name) = current_generation(index_dir)? {
        let dir = index_dir.join(GENERATIONS_DIR).join(&name);
        if !dir.is_dir() {
            bail!(
                "index at {} points to missing generation {name}",
                index_dir.display()
            );
        }
        return Ok(dir);
    }
    if index_dir.join(SUMMARY_FILE).is_file() {
        return Ok(index_dir.to_path_buf());
    }
    bail!(
        "no index found at {} (run `ngs build` first)",
        index_dir.display()
    )
}

fn prune_generations(index_dir: &Path, current: &str) -> Result<()> {
    let generations = index_dir.join(GENERATIONS_DIR);
    let mut published: Vec<String> = fs::read_dir(&generations)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.') && name != current)
        .collect();
    published.sort();
    let excess = published.len().saturating_sub(RETAINED_PREVIOUS_GENERATIONS);
    for name in published.into_iter().take(excess) {
        let dir = generations.join(&name);
        fs::remove_dir_all(&dir).with_context(|| format!("remove {}", dir.display()))?;
        tracing::debug!(generation = %name, "pruned index generation");
    }
    Ok(())
}

fn sync_dir(path: &Path) -> Result<()> {
    let dir = File::open(path)?;
    dir.sync_all()?;
    Ok(())
}

/// Loaded index, immutable after [`SearchIndex::load`]; share it behind an
/// `Arc`.
#[derive(Debug)]
pub struct SearchIndex {
    root: PathBuf,
    summary: IndexSummary,
    docs: Vec<DocumentMeta>,
    /// Row `i` belongs to `docs[i]`.
    vectors: Vec<Vec<f32>>,
    vocabulary: Vocabulary,
    by_id: HashMap<String, usize>,
}

impl SearchIndex {
    /// Load the published index under `index_dir`.
    pub fn load(index_dir: &Path) -> Result<Self> {
        let root = resolve_index_dir(index_dir)?;
        let summary: IndexSummary = read_json(&root.join(SUMMARY_FILE))?;
        let docs: Vec<DocumentMeta> = read_jsonl(&root.join(DOCS_FILE))?;
        let embeddings: Vec<DocEmbedding> = read_jsonl(&root.join(DOC_EMBEDDINGS_FILE))?;
        let vocab_path = root.join(VOCAB_FILE);
        let vocab: Vec<VocabEntry> = if vocab_path.exists() {
            read_jsonl(&vocab_path)?
        } else {
            Vec::new()
        };
        let index = Self::from_parts(root, summary, docs, embeddings, vocab)?;
        tracing::info!(
            path = %index.root.display(),
            docs = index.docs.len(),
            vocab = index.vocabulary.len(),
            method = %index.summary.embedding.method,
            "loaded search index"
        );
        Ok(index)
    }

    /// Validate and assemble an index from already-parsed artifacts.
    pub fn from_parts(
        root: PathBuf,
        summary: IndexSummary,
        docs: Vec<DocumentMeta>,
        embeddings: Vec<DocEmbedding>,
        mut vocab: Vec<VocabEntry>,
    ) -> Result<Self> {
        let dim = summary.embedding.dim;
        if dim == 0 {
            bail!("{} declares dimension 0", SUMMARY_FILE);
        }

        let mut by_id = HashMap::with_capacity(docs.len());
        for (idx, doc) in docs.iter().enumerate() {
            if by_id.insert(doc.doc_id.clone(), idx).is_some() {
                bail!("duplicate doc_id {:?} in {}", doc.doc_id, DOCS_FILE);
            }
        }

        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; docs.len()];
        for row in embeddings {
            if row.vector.len() != dim {
                bail!(
                    "embedding for {:?} has dimension {}, index declares {dim}",
                    row.doc_id,
                    row.vector.len()
                );
            }
            match by_id.get(&row.doc_id) {
                Some(&idx) => vectors[idx] = Some(row.vector),
                None => {
                    tracing::warn!(doc_id = %row.doc_id, "embedding without document metadata; ignored")
                }
            }
        }
        let vectors = vectors
            .into_iter()
            .zip(&docs)
            .map(|(vector, doc)| {
                vector.with_context(|| format!("document {:?} has no embedding", doc.doc_id))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(entry) = vocab.iter().find(|e| e.vector.len() != dim) {
            bail!(
                "vocabulary vector for {:?} has dimension {}, index declares {dim}",
                entry.token,
                entry.vector.len()
            );
        }
        vocab.sort_by(|a, b| a.token.cmp(&b.token));

        Ok(Self {
            root,
            summary,
            docs,
            vectors,
            vocabulary: Vocabulary::new(vocab),
            by_id,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn summary(&self) -> &IndexSummary {
        &self.summary
    }

    pub fn dimension(&self) -> usize {
        self.summary.embedding.dim
    }

    pub fn docs(&self) -> &[DocumentMeta] {
        &self.docs
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn doc(&self, doc_id: &str) -> Option<&DocumentMeta> {
        self.by_id.get(doc_id).map(|&idx| &self.docs[idx])
    }
}
