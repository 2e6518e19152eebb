//! Query expansion against the corpus vocabulary.
//!
//! Every distinct query token is embedded on its own and compared, by brute
//! force, with every vocabulary vector. Neighbors above the similarity floor
//! are kept, best first. Because both sides are hashed n-gram vectors, the
//! neighbors are mostly spelling variants and inflected forms of the query
//! token (`theotokos` → `theotocos`, `θεοτόκος` stays in its own script).

use std::collections::HashSet;

use rayon::prelude::*;
use serde::Serialize;

use super::canonicalize::canonicalize_for_embedding;
use super::hash_embedder::HashEmbedder;
use super::tokenize::tokenize;
use super::vector::dot_product;
use super::vocabulary::Vocabulary;
use crate::config::ExpansionConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub token: String,
    pub similarity: f32,
}

/// Neighbors of one query token, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expansion {
    pub token: String,
    pub neighbors: Vec<Neighbor>,
}

pub struct QueryExpander<'a> {
    vocabulary: &'a Vocabulary,
    embedder: &'a HashEmbedder,
    top_k: usize,
    min_sim: f32,
}

impl<'a> QueryExpander<'a> {
    pub fn new(vocabulary: &'a Vocabulary, embedder: &'a HashEmbedder, cfg: &ExpansionConfig) -> Self {
        Self {
            vocabulary,
            embedder,
            top_k: cfg.top_k,
            min_sim: cfg.min_sim,
        }
    }

    /// Expansion of every distinct query token, in order of first appearance.
    ///
    /// Tokens without qualifying neighbors are still listed, with an empty
    /// neighbor list.
    pub fn expand(&self, query: &str) -> Vec<Expansion> {
        let canonical = canonicalize_for_embedding(query);
        let mut seen = HashSet::new();
        tokenize(&canonical)
            .filter(|token| seen.insert(token.clone()))
            .map(|token| Expansion {
                neighbors: self.neighbors(&token),
                token,
            })
            .collect()
    }

    /// Up to `top_k` vocabulary tokens with similarity `>= min_sim`, never the
    /// token itself. Ties keep vocabulary (alphabetical) order.
    pub fn neighbors(&self, token: &str) -> Vec<Neighbor> {
        if self.top_k == 0 || self.vocabulary.is_empty() {
            return Vec::new();
        }
        let query = self.embedder.embed_token_unit(token);
        let mut hits: Vec<Neighbor> = self
            .vocabulary
            .entries()
            .par_iter()
            .filter(|entry| entry.token != token)
            .filter_map(|entry| {
                let similarity = dot_product(&query, &entry.vector);
                (similarity >= self.min_sim).then(|| Neighbor {
                    token: entry.token.clone(),
                    similarity,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(self.top_k);
        hits
    }

    /// Distinct neighbor tokens across all expansions embedded together like
    /// document text. `None` when no token has a neighbor.
    pub fn expansion_vector(&self, expansions: &[Expansion]) -> Option<Vec<f32>> {
        let mut seen = HashSet::new();
        let tokens: Vec<&str> = expansions
            .iter()
            .flat_map(|e| e.neighbors.iter())
            .map(|n| n.token.as_str())
            .filter(|t| seen.insert(*t))
            .collect();
        if tokens.is_empty() {
            return None;
        }
        Some(self.embedder.embed_tokens(tokens, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::vector::l2_norm;
    use crate::search::vocabulary::VocabEntry;

    fn vocabulary(embedder: &HashEmbedder, tokens: &[&str]) -> Vocabulary {
        let mut entries: Vec<VocabEntry> = tokens
            .iter()
            .map(|t| VocabEntry {
                token: t.to_string(),
                document_frequency: 2,
                vector: embedder.embed_token_unit(t),
            })
            .collect();
        entries.sort_by(|a, b| a.token.cmp(&b.token));
        Vocabulary::new(entries)
    }

    fn cfg(top_k: usize, min_sim: f32) -> ExpansionConfig {
        ExpansionConfig { top_k, min_sim }
    }

    #[test]
    fn test_excludes_self_and_respects_threshold() {
        let embedder = HashEmbedder::default();
        let vocab = vocabulary(&embedder, &["theotokos", "theotocos", "nestorius", "concilium"]);
        let expander = QueryExpander::new(&vocab, &embedder, &cfg(5, 0.35));
        let neighbors = expander.neighbors("theotokos");
        assert!(neighbors.iter().all(|n| n.token != "theotokos"));
        assert!(neighbors.iter().all(|n| n.similarity >= 0.35));
        assert!(neighbors.iter().any(|n| n.token == "theotocos"));
    }

    #[test]
    fn test_top_k_and_descending_order() {
        let embedder = HashEmbedder::default();
        let vocab = vocabulary(
            &embedder,
            &["logos", "logoi", "logou", "logon", "logois", "logw"],
        );
        let expander = QueryExpander::new(&vocab, &embedder, &cfg(2, -1.0));
        let neighbors = expander.neighbors("logos");
        assert_eq!(neighbors.len(), 2);
        assert!(neighbors[0].similarity >= neighbors[1].similarity);
    }

    #[test]
    fn test_expand_keeps_first_appearance_order() {
        let embedder = HashEmbedder::default();
        let vocab = vocabulary(&embedder, &["theotocos"]);
        let expander = QueryExpander::new(&vocab, &embedder, &cfg(5, 0.35));
        let expansions = expander.expand("Theotokos und Nestorius theotokos");
        let tokens: Vec<_> = expansions.iter().map(|e| e.token.as_str()).collect();
        assert_eq!(tokens, vec!["theotokos", "nestorius"]);
    }

    #[test]
    fn test_expansion_vector_none_without_neighbors() {
        let embedder = HashEmbedder::default();
        let vocab = Vocabulary::default();
        let expander = QueryExpander::new(&vocab, &embedder, &cfg(5, 0.35));
        let expansions = expander.expand("theotokos");
        assert_eq!(expansions.len(), 1);
        assert!(expansions[0].neighbors.is_empty());
        assert!(expander.expansion_vector(&expansions).is_none());
    }

    #[test]
    fn test_expansion_vector_is_unit() {
        let embedder = HashEmbedder::default();
        let vocab = vocabulary(&embedder, &["theotocos", "theotokou"]);
        let expander = QueryExpander::new(&vocab, &embedder, &cfg(5, -1.0));
        let expansions = expander.expand("theotokos");
        let v = expander.expansion_vector(&expansions).unwrap();
        assert!((l2_norm(&v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_top_k_disables_expansion() {
        let embedder = HashEmbedder::default();
        let vocab = vocabulary(&embedder, &["theotocos"]);
        let expander = QueryExpander::new(&vocab, &embedder, &cfg(0, -1.0));
        assert!(expander.neighbors("theotokos").is_empty());
    }
}
