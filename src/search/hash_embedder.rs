//! Character n-gram feature hashing embedder.
//!
//! Every token is wrapped in boundary markers (`<logos>`), cut into all
//! character n-grams of length `ngram_min..=ngram_max`, and each n-gram plus
//! the bare token is hashed into one of `dimension` buckets with a ±1 sign.
//! A text vector is the sum of its tokens' contributions, L2-normalized.
//!
//! Properties:
//! - No vocabulary is needed to encode arbitrary text.
//! - Inflected forms and spelling variants share most n-grams and therefore
//!   land close together.
//! - Fully deterministic for a fixed dimension, n-gram range and hash.
//!
//! # Hash
//!
//! SHA-256 over the UTF-8 bytes of the feature. Bucket = first 4 digest
//! bytes as little-endian u32 mod `dimension`; sign = +1 when digest byte 4 is
//! even, -1 otherwise. Vocabulary, document and query vectors of one index
//! must all come from this same function.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use super::embedder::{Embedder, EmbedderResult};
use super::tokenize::tokenize;
use super::vector::l2_normalize;
use crate::config::{DEFAULT_DIM, DEFAULT_NGRAM_MAX, DEFAULT_NGRAM_MIN, EmbeddingConfig};

/// Method name recorded in the index summary for hashed indexes.
pub const HASH_EMBEDDER_METHOD: &str = "char_ngram_hash";

/// Sparse bucket → weight map for one token, sorted by bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenFeatures {
    entries: Vec<(usize, f32)>,
}

impl TokenFeatures {
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add this token's raw contribution into a dense accumulator.
    pub fn add_to(&self, acc: &mut [f32]) {
        for &(bucket, weight) in &self.entries {
            acc[bucket] += weight;
        }
    }
}

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    ngram_min: usize,
    ngram_max: usize,
}

impl HashEmbedder {
    /// `dimension` must be non-zero and `1 <= ngram_min <= ngram_max`;
    /// [`crate::config::SearchConfig::validate`] enforces this for configured
    /// values.
    pub fn new(dimension: usize, ngram_min: usize, ngram_max: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            ngram_min: ngram_min.max(1),
            ngram_max: ngram_max.max(ngram_min.max(1)),
        }
    }

    pub fn from_config(cfg: &EmbeddingConfig) -> Self {
        Self::new(cfg.dim, cfg.ngram_min, cfg.ngram_max)
    }

    pub fn default_dimension() -> Self {
        Self::new(DEFAULT_DIM, DEFAULT_NGRAM_MIN, DEFAULT_NGRAM_MAX)
    }

    /// Sparse features of one token.
    pub fn token_features(&self, token: &str) -> TokenFeatures {
        let token = token.to_lowercase();
        let wrapped = format!("<{token}>");
        // Byte offset of every char start plus the end, so n-grams are char based.
        let bounds: Vec<usize> = wrapped
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(wrapped.len()))
            .collect();
        let char_len = bounds.len() - 1;

        let mut feats: BTreeMap<usize, f32> = BTreeMap::new();
        for n in self.ngram_min..=self.ngram_max {
            if char_len < n {
                continue;
            }
            for start in 0..=(char_len - n) {
                let ngram = &wrapped[bounds[start]..bounds[start + n]];
                let (bucket, sign) = hash_feature(ngram, self.dimension);
                *feats.entry(bucket).or_insert(0.0) += sign;
            }
        }
        let (bucket, sign) = hash_feature(&token, self.dimension);
        *feats.entry(bucket).or_insert(0.0) += sign;

        TokenFeatures {
            entries: feats.into_iter().collect(),
        }
    }

    /// Dense, unnormalized contribution vector of one token.
    pub fn embed_token(&self, token: &str) -> Vec<f32> {
        let mut vec = vec![0.0; self.dimension];
        self.token_features(token).add_to(&mut vec);
        vec
    }

    /// Unit-length token vector, as stored in the vocabulary and compared
    /// during query expansion.
    pub fn embed_token_unit(&self, token: &str) -> Vec<f32> {
        let mut vec = self.embed_token(token);
        l2_normalize(&mut vec);
        vec
    }

    /// Tokenize, sum raw token contributions, L2-normalize.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let canonical = super::canonicalize::canonicalize_for_embedding(text);
        self.embed_tokens(tokenize(&canonical), None)
    }

    /// Sum the raw contributions of already-tokenized input and normalize.
    ///
    /// With a cache, known tokens reuse their precomputed features.
    pub fn embed_tokens<I, S>(&self, tokens: I, cache: Option<&TokenCache>) -> Vec<f32>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut acc = vec![0.0; self.dimension];
        for token in tokens {
            let token = token.as_ref();
            match cache.and_then(|c| c.get(token)) {
                Some(features) => features.add_to(&mut acc),
                None => self.token_features(token).add_to(&mut acc),
            }
        }
        l2_normalize(&mut acc);
        acc
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::default_dimension()
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> EmbedderResult<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn id(&self) -> &str {
        HASH_EMBEDDER_METHOD
    }

    fn is_semantic(&self) -> bool {
        false
    }
}

/// Bucket and sign of one feature string.
fn hash_feature(feature: &str, dimension: usize) -> (usize, f32) {
    let digest = Sha256::digest(feature.as_bytes());
    let raw = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let bucket = raw as usize % dimension;
    let sign = if digest[4] % 2 == 0 { 1.0 } else { -1.0 };
    (bucket, sign)
}

/// Token → features memo for a single index build.
///
/// Filled once, in parallel, from the corpus' distinct tokens after the
/// document-frequency pass, then shared read-only by the vocabulary and
/// document passes. Dropped when the build returns.
#[derive(Debug, Default)]
pub struct TokenCache {
    features: HashMap<String, TokenFeatures>,
}

impl TokenCache {
    pub fn build<'a, I>(embedder: &HashEmbedder, tokens: I) -> Self
    where
        I: IntoParallelIterator<Item = &'a String>,
    {
        let features = tokens
            .into_par_iter()
            .map(|token| (token.clone(), embedder.token_features(token)))
            .collect();
        Self { features }
    }

    pub fn get(&self, token: &str) -> Option<&TokenFeatures> {
        self.features.get(token)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
