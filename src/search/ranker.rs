//! Query-time ranking over a loaded [`SearchIndex`].
//!
//! The ranker is written once against the [`Embedder`] trait: the query is
//! embedded by the backend the index was built with, optionally blended with
//! its vocabulary expansion (hash indexes only), and every document vector is
//! scored by dot product. Results are sorted by descending score with a
//! stable sort, so equal scores keep document order.

use std::cmp::Ordering;
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use super::embedder::{Embedder, EmbedderError};
use super::expansion::{Expansion, QueryExpander};
use super::hash_embedder::HashEmbedder;
use super::vector::{add_scaled, dot_product, l2_normalize};
use crate::config::ExpansionConfig;
use crate::model::types::{ScoredDoc, SearchHit};
use crate::storage::index_store::SearchIndex;

/// Weight of the expansion vector when blended into the query vector.
pub const EXPANSION_BLEND_WEIGHT: f32 = 0.5;

/// Paragraphs embedded per backend call when picking a snippet.
const PARAGRAPH_BATCH: usize = 16;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query embedder produces dimension {actual}, index was built with {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Embedder(#[from] EmbedderError),

    #[error("unknown document {0:?}")]
    UnknownDocument(String),
}

pub type SearchResult<T> = Result<T, SearchError>;

/// An embedded query, with the expansions that went into it.
#[derive(Debug, Clone)]
pub struct QueryVector {
    /// Ranking vector, blended with the expansion when there is one.
    pub vector: Vec<f32>,
    /// Embedding of the query text alone; picks paragraphs.
    pub plain: Vec<f32>,
    pub expansions: Vec<Expansion>,
}

pub struct Ranker {
    index: Arc<SearchIndex>,
    embedder: Arc<dyn Embedder>,
    /// Present for hash indexes; the vocabulary lives in its space.
    expansion_hasher: Option<HashEmbedder>,
    expansion: ExpansionConfig,
}

impl Ranker {
    /// Pair an index with the backend that embeds its queries.
    ///
    /// Expansion settings default to the ones stored with the index.
    pub fn new(index: Arc<SearchIndex>, embedder: Arc<dyn Embedder>) -> SearchResult<Self> {
        if embedder.dimension() != index.dimension() {
            return Err(SearchError::DimensionMismatch {
                expected: index.dimension(),
                actual: embedder.dimension(),
            });
        }
        let summary = index.summary();
        let expansion_hasher = summary
            .is_hash_index()
            .then(|| HashEmbedder::from_config(&summary.search_config().embedding));
        let expansion = summary.query_expansion.clone();
        Ok(Self {
            index,
            embedder,
            expansion_hasher,
            expansion,
        })
    }

    pub fn with_expansion(mut self, expansion: ExpansionConfig) -> Self {
        self.expansion = expansion;
        self
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Whether [`Ranker::expand`] can return neighbors at all.
    pub fn expansion_available(&self) -> bool {
        self.expansion_hasher.is_some() && !self.index.vocabulary().is_empty()
    }

    fn expander(&self) -> Option<QueryExpander<'_>> {
        let hasher = self.expansion_hasher.as_ref()?;
        Some(QueryExpander::new(
            self.index.vocabulary(),
            hasher,
            &self.expansion,
        ))
    }

    /// Vocabulary neighbors of each query token. Empty for non-hash indexes.
    pub fn expand(&self, query: &str) -> Vec<Expansion> {
        self.expander()
            .map(|expander| expander.expand(query))
            .unwrap_or_default()
    }

    /// Backend embedding of `query`, blended with its expansion when
    /// `expand` is set and the index supports it.
    pub fn query_vector(&self, query: &str, expand: bool) -> SearchResult<QueryVector> {
        let mut vector = self.embedder.embed(query)?;
        if vector.len() != self.index.dimension() {
            return Err(SearchError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: vector.len(),
            });
        }

        let plain = vector.clone();
        let mut expansions = Vec::new();
        if expand && let Some(expander) = self.expander() {
            expansions = expander.expand(query);
            if let Some(extra) = expander.expansion_vector(&expansions) {
                add_scaled(&mut vector, &extra, EXPANSION_BLEND_WEIGHT);
                l2_normalize(&mut vector);
            }
        }
        Ok(QueryVector {
            vector,
            plain,
            expansions,
        })
    }

    /// Top `top_n` documents for `query`.
    pub fn search(&self, query: &str, top_n: usize, expand: bool) -> SearchResult<Vec<ScoredDoc>> {
        let query = self.query_vector(query, expand)?;
        Ok(self.rank(&query.vector, top_n))
    }

    /// Score every document against an already-embedded query.
    pub fn rank(&self, query_vector: &[f32], top_n: usize) -> Vec<ScoredDoc> {
        let docs = self.index.docs();
        rank_by_dot(query_vector, self.index.vectors(), top_n)
            .into_iter()
            .map(|(idx, score)| ScoredDoc {
                doc_id: docs[idx].doc_id.clone(),
                score,
            })
            .collect()
    }

    /// The paragraph of `doc_id` closest to `query_vector`; `None` when the
    /// document has no paragraphs. Ties keep the earliest paragraph.
    pub fn best_paragraph(&self, doc_id: &str, query_vector: &[f32]) -> SearchResult<Option<String>> {
        let doc = self
            .index
            .doc(doc_id)
            .ok_or_else(|| SearchError::UnknownDocument(doc_id.to_string()))?;

        let mut best: Option<(&String, f32)> = None;
        for batch in doc.paragraphs.chunks(PARAGRAPH_BATCH) {
            let texts: Vec<&str> = batch.iter().map(String::as_str).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            for (paragraph, vector) in batch.iter().zip(vectors) {
                let score = dot_product(query_vector, &vector);
                if best.is_none_or(|(_, top)| score > top) {
                    best = Some((paragraph, score));
                }
            }
        }
        Ok(best.map(|(paragraph, _)| paragraph.clone()))
    }

    /// Ranked results with display title and snippet.
    pub fn search_with_snippets(
        &self,
        query: &str,
        top_n: usize,
        expand: bool,
    ) -> SearchResult<Vec<SearchHit>> {
        let query = self.query_vector(query, expand)?;
        self.hits(&query, top_n)
    }

    /// Rank against an embedded query and attach title and snippet.
    ///
    /// Documents are ranked by the blended vector. The snippet is the
    /// paragraph closest to the unexpanded query, or the stored document
    /// snippet when the document carries no paragraphs.
    pub fn hits(&self, query: &QueryVector, top_n: usize) -> SearchResult<Vec<SearchHit>> {
        self.rank(&query.vector, top_n)
            .into_iter()
            .map(|scored| {
                let snippet = self.best_paragraph(&scored.doc_id, &query.plain)?;
                let meta = self
                    .index
                    .doc(&scored.doc_id)
                    .ok_or_else(|| SearchError::UnknownDocument(scored.doc_id.clone()))?;
                Ok(SearchHit {
                    title: meta.display_title().to_string(),
                    snippet: snippet.unwrap_or_else(|| meta.snippet.clone()),
                    doc_id: scored.doc_id,
                    score: scored.score,
                })
            })
            .collect()
    }
}

/// Indices and scores of the `top_n` best `vectors`, best first.
///
/// Stable: equal scores keep their input order.
pub fn rank_by_dot(query: &[f32], vectors: &[Vec<f32>], top_n: usize) -> Vec<(usize, f32)> {
    if top_n == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(usize, f32)> = vectors
        .par_iter()
        .enumerate()
        .map(|(idx, vector)| (idx, dot_product(query, vector)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(top_n);
    scored
}
