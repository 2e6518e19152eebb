//! Corpus records and the rows persisted in an index generation.

use serde::{Deserialize, Deserializer, Serialize};

/// One line of the input corpus (`corpus.jsonl`).
///
/// Produced by the TEI extraction step; unknown fields are ignored and
/// `null` text fields are treated as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub doc_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text_main: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text_notes: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub paragraphs: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One row of `docs.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub doc_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub token_count: usize,
    #[serde(default)]
    pub text_len: usize,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paragraphs: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl DocumentMeta {
    /// Display title, falling back to the document id.
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => &self.doc_id,
        }
    }
}

/// One row of `doc_embeddings.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocEmbedding {
    pub doc_id: String,
    pub vector: Vec<f32>,
}

/// A ranked document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
    pub doc_id: String,
    pub score: f32,
}

/// A ranked document with display fields, as returned by the CLI and HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f32,
    pub title: String,
    pub snippet: String,
}
