//! Corpus vocabulary: document frequencies and token embeddings.
//!
//! Built in two passes separated by a barrier:
//!
//! 1. [`count_document_frequencies`] folds every document's distinct tokens
//!    into per-thread counters and reduces them into one corpus-wide map.
//! 2. [`build_vocabulary`] keeps tokens that pass [`is_vocabulary_candidate`]
//!    and embeds each independently.
//!
//! Membership depends on corpus-wide counts, so pass 2 cannot start before
//! pass 1 has fully reduced.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::embedder::Embedder;
use super::hash_embedder::{HashEmbedder, TokenCache};
use super::tokenize::is_stopword;
use super::vector::{l2_normalize, round_components};

/// Vocabulary tokens must be at least this many characters.
pub const MIN_VOCAB_TOKEN_CHARS: usize = 3;

/// token → number of documents containing it.
pub type DocumentFrequencies = HashMap<String, usize>;

/// One row of `vocab.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub token: String,
    #[serde(alias = "df")]
    pub document_frequency: usize,
    pub vector: Vec<f32>,
}

/// Pass 1: count, for every token, the number of documents it occurs in.
///
/// `documents` yields each document's token list; repeats within a document
/// count once.
pub fn count_document_frequencies<D>(documents: &[D]) -> DocumentFrequencies
where
    D: AsRef<[String]> + Sync,
{
    documents
        .par_iter()
        .fold(DocumentFrequencies::new, |mut df, doc| {
            let distinct: HashSet<&str> = doc.as_ref().iter().map(String::as_str).collect();
            for token in distinct {
                *df.entry(token.to_string()).or_insert(0) += 1;
            }
            df
        })
        .reduce(DocumentFrequencies::new, |a, b| {
            let (mut big, small) = if a.len() >= b.len() { (a, b) } else { (b, a) };
            for (token, count) in small {
                *big.entry(token).or_insert(0) += count;
            }
            big
        })
}

/// Vocabulary admission rule.
pub fn is_vocabulary_candidate(token: &str, document_frequency: usize, min_df: usize) -> bool {
    document_frequency >= min_df
        && token.chars().nth(MIN_VOCAB_TOKEN_CHARS - 1).is_some()
        && !is_stopword(token)
}

/// Pass 2: embed every admitted token. Output is sorted by token.
pub fn build_vocabulary(
    df: &DocumentFrequencies,
    embedder: &HashEmbedder,
    cache: &TokenCache,
    min_df: usize,
    decimals: u32,
) -> Vec<VocabEntry> {
    let mut entries: Vec<VocabEntry> = df
        .par_iter()
        .filter(|(token, count)| is_vocabulary_candidate(token, **count, min_df))
        .map(|(token, count)| {
            let mut vector = match cache.get(token) {
                Some(features) => {
                    let mut dense = vec![0.0; embedder.dimension()];
                    features.add_to(&mut dense);
                    dense
                }
                None => embedder.embed_token(token),
            };
            l2_normalize(&mut vector);
            round_components(&mut vector, decimals);
            VocabEntry {
                token: token.clone(),
                document_frequency: *count,
                vector,
            }
        })
        .collect();
    entries.par_sort_unstable_by(|a, b| a.token.cmp(&b.token));
    entries
}

/// Loaded vocabulary, read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    entries: Vec<VocabEntry>,
}

impl Vocabulary {
    pub fn new(entries: Vec<VocabEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[VocabEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries are sorted by token, so membership is a binary search.
    pub fn get(&self, token: &str) -> Option<&VocabEntry> {
        self.entries
            .binary_search_by(|e| e.token.as_str().cmp(token))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    pub fn contains(&self, token: &str) -> bool {
        self.get(token).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tokenize::tokenize;
    use crate::search::vector::l2_norm;

    fn docs(texts: &[&str]) -> Vec<Vec<String>> {
        texts.iter().map(|t| tokenize(t).collect()).collect()
    }

    fn build(texts: &[&str], min_df: usize) -> Vec<VocabEntry> {
        let tokens = docs(texts);
        let df = count_document_frequencies(&tokens);
        let embedder = HashEmbedder::default();
        let cache = TokenCache::build(&embedder, df.par_iter().map(|(t, _)| t));
        build_vocabulary(&df, &embedder, &cache, min_df, 6)
    }

    #[test]
    fn test_document_frequency_counts_once_per_document() {
        let df = count_document_frequencies(&docs(&[
            "logos logos logos",
            "logos kyrios",
            "kyrios",
        ]));
        assert_eq!(df["logos"], 2);
        assert_eq!(df["kyrios"], 2);
        assert_eq!(df.len(), 2);
    }

    #[test]
    fn test_min_df_excludes_rare_tokens() {
        let texts = ["logos theos", "theos kyrios", "kyrios theos"];
        let vocab = build(&texts, 2);
        let tokens: Vec<_> = vocab.iter().map(|e| e.token.as_str()).collect();
        assert_eq!(tokens, vec!["kyrios", "theos"]);

        let vocab = build(&texts, 1);
        assert!(vocab.iter().any(|e| e.token == "logos"));
    }

    #[test]
    fn test_short_tokens_and_stopwords_excluded() {
        let vocab = build(&["ab ab quod", "ab ab quod"], 1);
        assert!(vocab.is_empty());
    }

    #[test]
    fn test_entries_sorted_and_normalized() {
        let vocab = build(&["zeta alpha mu beta", "zeta alpha beta"], 1);
        let tokens: Vec<_> = vocab.iter().map(|e| e.token.clone()).collect();
        let mut sorted = tokens.clone();
        sorted.sort();
        assert_eq!(tokens, sorted);
        for entry in &vocab {
            assert_eq!(entry.vector.len(), 256);
            assert!((l2_norm(&entry.vector) - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_vocabulary_lookup() {
        let vocab = Vocabulary::new(build(&["theos kyrios", "theos kyrios"], 2));
        assert_eq!(vocab.len(), 2);
        assert!(vocab.contains("theos"));
        assert!(!vocab.contains("logos"));
        assert_eq!(vocab.get("kyrios").unwrap().document_frequency, 2);
    }

    #[test]
    fn test_legacy_df_field_name() {
        let entry: VocabEntry =
            serde_json::from_str(r#"{"token":"logos","df":3,"vector":[1.0]}"#).unwrap();
        assert_eq!(entry.document_frequency, 3);
    }

    #[test]
    fn test_candidate_rule() {
        assert!(is_vocabulary_candidate("logos", 2, 2));
        assert!(!is_vocabulary_candidate("logos", 1, 2));
        assert!(!is_vocabulary_candidate("ab", 5, 1));
        assert!(!is_vocabulary_candidate("quod", 5, 1));
        assert!(is_vocabulary_candidate("λόγ", 1, 1));
    }
}
