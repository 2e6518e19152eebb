//! Index and query configuration.
//!
//! All tunables for the hashed n-gram engine live in one [`SearchConfig`]:
//! the embedding section controls how vectors are produced and stored, the
//! expansion section controls nearest-neighbor query expansion.
//!
//! Resolution order (later wins):
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config path.toml`)
//! 3. Environment variables (`NGS_*`, `.env` honoured via dotenvy)
//! 4. Explicit CLI flags
//!
//! Once an index is built, the configuration stored in its `index_meta.json`
//! is authoritative for queries against it.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Default embedding dimension.
pub const DEFAULT_DIM: usize = 256;
/// Shortest character n-gram hashed per token.
pub const DEFAULT_NGRAM_MIN: usize = 3;
/// Longest character n-gram hashed per token.
pub const DEFAULT_NGRAM_MAX: usize = 5;
/// Minimum number of documents a token must occur in to join the vocabulary.
pub const DEFAULT_MIN_DF: usize = 2;
/// Decimal places kept when persisting vectors.
pub const DEFAULT_DECIMALS: u32 = 6;
/// Neighbors kept per query token during expansion.
pub const DEFAULT_TOP_K: usize = 5;
/// Minimum cosine similarity for an expansion neighbor.
pub const DEFAULT_MIN_SIM: f32 = 0.35;

/// Upper bound on stored precision; f32 carries ~7 significant digits.
const MAX_DECIMALS: u32 = 9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dim: usize,
    pub ngram_min: usize,
    pub ngram_max: usize,
    pub min_df: usize,
    pub decimals: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dim: DEFAULT_DIM,
            ngram_min: DEFAULT_NGRAM_MIN,
            ngram_max: DEFAULT_NGRAM_MAX,
            min_df: DEFAULT_MIN_DF,
            decimals: DEFAULT_DECIMALS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub top_k: usize,
    pub min_sim: f32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_sim: DEFAULT_MIN_SIM,
        }
    }
}

/// Complete configuration passed to the builder and the ranker.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub embedding: EmbeddingConfig,
    pub expansion: ExpansionConfig,
}

impl SearchConfig {
    /// Load config from environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            Some(path) => {
                let mut cfg = Self::from_toml_file(path)?;
                cfg.apply_env();
                cfg
            }
            None => Self::from_env(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let cfg: Self =
            toml::from_str(&raw).with_context(|| format!("parse config file {}", path.display()))?;
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Some(dim) = env_parse("NGS_DIM") {
            self.embedding.dim = dim;
        }
        if let Some(min) = env_parse("NGS_NGRAM_MIN") {
            self.embedding.ngram_min = min;
        }
        if let Some(max) = env_parse("NGS_NGRAM_MAX") {
            self.embedding.ngram_max = max;
        }
        if let Some(min_df) = env_parse("NGS_MIN_DF") {
            self.embedding.min_df = min_df;
        }
        if let Some(decimals) = env_parse("NGS_DECIMALS") {
            self.embedding.decimals = decimals;
        }
        if let Some(top_k) = env_parse("NGS_TOP_K") {
            self.expansion.top_k = top_k;
        }
        if let Some(min_sim) = env_parse("NGS_MIN_SIM") {
            self.expansion.min_sim = min_sim;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let e = &self.embedding;
        if e.dim == 0 {
            bail!("embedding dimension must be non-zero");
        }
        if e.ngram_min == 0 || e.ngram_min > e.ngram_max {
            bail!(
                "invalid n-gram range [{}, {}]: need 1 <= min <= max",
                e.ngram_min,
                e.ngram_max
            );
        }
        if e.min_df == 0 {
            bail!("min_df must be at least 1");
        }
        if e.decimals > MAX_DECIMALS {
            bail!("decimals must be <= {MAX_DECIMALS}, got {}", e.decimals);
        }
        let x = &self.expansion;
        if !x.min_sim.is_finite() || !(-1.0..=1.0).contains(&x.min_sim) {
            bail!("expansion min_sim must be within [-1, 1], got {}", x.min_sim);
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = dotenvy::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable config override");
            None
        }
    }
}
