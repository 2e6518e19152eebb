//! Index build pipeline: corpus → vocabulary + document vectors → published
//! generation.
//!
//! Hash backend:
//! 1. Canonicalize and tokenize every document (parallel).
//! 2. Pass 1: corpus-wide document frequencies (parallel fold, one reduce).
//! 3. Fill the build's [`TokenCache`] from the distinct tokens.
//! 4. Pass 2: vocabulary vectors and document vectors (parallel, cache shared
//!    read-only).
//! 5. Publish atomically.
//!
//! Model backends skip 2-4 and embed each document's text directly; their
//! indexes carry no vocabulary.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::SearchConfig;
use crate::model::types::{CorpusDocument, DocumentMeta};
use crate::search::doc_index::{
    PreparedDocument, embed_documents, embed_documents_hashed, prepare_documents,
};
use crate::search::embedder::Embedder;
use crate::search::embedder_registry::{EmbedderRegistry, HASH_EMBEDDER, get_embedder_or_hash};
use crate::search::hash_embedder::{HASH_EMBEDDER_METHOD, HashEmbedder, TokenCache};
use crate::search::tokenize::stopword_count;
use crate::search::vocabulary::{build_vocabulary, count_document_frequencies};
use crate::storage::index_store::{
    EmbeddingSummary, IndexArtifacts, IndexCounts, IndexSummary, publish_generation,
};
use crate::storage::jsonl::read_jsonl;

#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// NDJSON corpus, one document per line.
    pub corpus: PathBuf,
    /// Directory receiving `CURRENT` and `generations/`.
    pub index_dir: PathBuf,
    /// Data directory holding model caches.
    pub data_dir: PathBuf,
    pub config: SearchConfig,
    /// Registry name of the backend; `None` = hash.
    pub embedder: Option<String>,
    /// Fail instead of falling back to hash when the backend is unavailable.
    pub strict_embedder: bool,
    pub show_progress: bool,
}

/// What a build published.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub generation: String,
    pub path: PathBuf,
    pub summary: IndexSummary,
    pub elapsed_ms: u128,
}

/// Read the NDJSON corpus. Blank lines are skipped; duplicate ids are an
/// error.
pub fn read_corpus(path: &Path) -> Result<Vec<CorpusDocument>> {
    let docs: Vec<CorpusDocument> =
        read_jsonl(path).with_context(|| format!("read corpus {}", path.display()))?;
    let mut seen = HashSet::with_capacity(docs.len());
    for doc in &docs {
        if doc.doc_id.trim().is_empty() {
            bail!("corpus {} contains a document with an empty doc_id", path.display());
        }
        if !seen.insert(doc.doc_id.as_str()) {
            bail!("duplicate doc_id {:?} in corpus {}", doc.doc_id, path.display());
        }
    }
    Ok(docs)
}

pub fn run_build(opts: &IndexOptions) -> Result<BuildReport> {
    let started = Instant::now();
    let cfg = &opts.config;
    cfg.validate()?;

    let progress = spinner(opts.show_progress);
    progress.set_message(format!("Reading {}", opts.corpus.display()));
    let corpus = read_corpus(&opts.corpus)?;
    if corpus.is_empty() {
        tracing::warn!(corpus = %opts.corpus.display(), "corpus is empty; publishing an empty index");
    }
    tracing::info!(docs = corpus.len(), corpus = %opts.corpus.display(), "corpus loaded");

    let embedder = get_embedder_or_hash(
        &opts.data_dir,
        opts.embedder.as_deref(),
        &cfg.embedding,
        opts.strict_embedder,
    )?;
    let info = embedder.info();
    tracing::info!(
        backend = %info.id,
        dim = info.dimension,
        semantic = info.is_semantic,
        "embedding backend selected"
    );
    let embedder_id = EmbedderRegistry::new(&opts.data_dir)
        .get(embedder.id())
        .map(|e| e.name)
        .unwrap_or(HASH_EMBEDDER);

    progress.set_message(format!("Tokenizing {} documents", corpus.len()));
    let prepared = prepare_documents(corpus);

    let (embeddings, vocab) = if embedder.id() == HASH_EMBEDDER_METHOD {
        let hasher = HashEmbedder::from_config(&cfg.embedding);

        progress.set_message("Counting document frequencies");
        let df = count_document_frequencies(&prepared);
        tracing::info!(distinct_tokens = df.len(), "document frequencies counted");

        progress.set_message(format!("Hashing {} distinct tokens", df.len()));
        let cache = TokenCache::build(&hasher, df.par_iter().map(|(token, _)| token));

        progress.set_message("Embedding vocabulary");
        let vocab = build_vocabulary(
            &df,
            &hasher,
            &cache,
            cfg.embedding.min_df,
            cfg.embedding.decimals,
        );
        tracing::info!(vocab = vocab.len(), min_df = cfg.embedding.min_df, "vocabulary built");

        progress.set_message("Embedding documents");
        let embeddings =
            embed_documents_hashed(&prepared, &hasher, &cache, cfg.embedding.decimals);
        (embeddings, vocab)
    } else {
        progress.set_message(format!("Embedding documents with {}", embedder.id()));
        let embeddings = embed_documents(&prepared, embedder.as_ref(), cfg.embedding.decimals)
            .with_context(|| format!("embed documents with {}", embedder.id()))?;
        (embeddings, Vec::new())
    };

    let generated_on = Utc::now();
    let generation = generation_name(generated_on, &prepared, cfg, embedder.id());
    let docs: Vec<DocumentMeta> = prepared.into_iter().map(|p| p.meta).collect();

    let summary = IndexSummary {
        generated_on,
        generation: generation.clone(),
        embedding: EmbeddingSummary {
            method: embedder.id().to_string(),
            embedder_id: embedder_id.to_string(),
            dim: embedder.dimension(),
            ngram_min: cfg.embedding.ngram_min,
            ngram_max: cfg.embedding.ngram_max,
            min_df: cfg.embedding.min_df,
            stopwords: stopword_count(),
            decimals: cfg.embedding.decimals,
        },
        query_expansion: cfg.expansion.clone(),
        counts: IndexCounts {
            docs: docs.len(),
            vocab: vocab.len(),
        },
    };

    progress.set_message("Publishing index");
    let path = publish_generation(
        &opts.index_dir,
        &IndexArtifacts {
            summary: &summary,
            docs: &docs,
            embeddings: &embeddings,
            vocab: &vocab,
        },
    )?;
    progress.finish_and_clear();

    let elapsed_ms = started.elapsed().as_millis();
    tracing::info!(
        docs = summary.counts.docs,
        vocab = summary.counts.vocab,
        dim = summary.embedding.dim,
        method = %summary.embedding.method,
        elapsed_ms,
        "index build complete"
    );

    let generation = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(generation);
    Ok(BuildReport {
        generation,
        path,
        summary,
        elapsed_ms,
    })
}

/// `<UTC timestamp>-<content hash prefix>`; sorts chronologically.
fn generation_name(
    now: DateTime<Utc>,
    docs: &[PreparedDocument],
    cfg: &SearchConfig,
    method: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(serde_json::to_vec(cfg).unwrap_or_default());
    for doc in docs {
        hasher.update(doc.meta.doc_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.text.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", now.format("%Y%m%dT%H%M%SZ"), &digest[..12])
}

fn spinner(show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
        progress.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}
