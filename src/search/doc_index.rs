//! Per-document preparation and embedding.
//!
//! [`prepare_documents`] canonicalizes and tokenizes each corpus record once;
//! the resulting token lists feed both the document-frequency pass and the
//! hashed document embeddings, so the two can never disagree about what a
//! document contains.

use rayon::prelude::*;

use super::canonicalize::{
    SNIPPET_CHARS, chunk_text, combine_fields, normalize_whitespace, truncate_to_chars,
};
use super::embedder::{Embedder, EmbedderError, EmbedderResult};
use super::hash_embedder::{HashEmbedder, TokenCache};
use super::tokenize::tokenize;
use super::vector::{add_scaled, l2_normalize, round_components};
use crate::model::types::{CorpusDocument, DocEmbedding, DocumentMeta};

/// Longest text piece handed to a model backend in one call.
pub const MODEL_CHUNK_CHARS: usize = 4000;

/// A corpus record after canonicalization and tokenization.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub meta: DocumentMeta,
    /// Canonical main + annotation text.
    pub text: String,
    pub tokens: Vec<String>,
}

impl AsRef<[String]> for PreparedDocument {
    fn as_ref(&self) -> &[String] {
        &self.tokens
    }
}

/// Canonicalize and tokenize every document, preserving input order.
pub fn prepare_documents(docs: Vec<CorpusDocument>) -> Vec<PreparedDocument> {
    docs.into_par_iter().map(prepare_document).collect()
}

pub fn prepare_document(doc: CorpusDocument) -> PreparedDocument {
    let text = combine_fields(&doc.text_main, &doc.text_notes);
    let tokens: Vec<String> = tokenize(&text).collect();
    let paragraphs = doc
        .paragraphs
        .iter()
        .map(|p| normalize_whitespace(p))
        .filter(|p| !p.is_empty())
        .collect();

    let meta = DocumentMeta {
        doc_id: doc.doc_id,
        title: doc.title,
        lang: doc.lang,
        token_count: tokens.len(),
        text_len: text.chars().count(),
        snippet: truncate_to_chars(&text, SNIPPET_CHARS),
        paragraphs,
        metadata: doc.metadata,
    };
    PreparedDocument { meta, text, tokens }
}

/// Hashed document vectors, reusing the build's token cache.
///
/// A document without tokens gets the zero vector.
pub fn embed_documents_hashed(
    docs: &[PreparedDocument],
    embedder: &HashEmbedder,
    cache: &TokenCache,
    decimals: u32,
) -> Vec<DocEmbedding> {
    docs.par_iter()
        .map(|doc| {
            let mut vector = embedder.embed_tokens(&doc.tokens, Some(cache));
            round_components(&mut vector, decimals);
            DocEmbedding {
                doc_id: doc.meta.doc_id.clone(),
                vector,
            }
        })
        .collect()
}

/// Document vectors from any backend.
///
/// Long documents are split with [`chunk_text`]; the document vector is the
/// normalized mean of its chunk vectors. Documents whose canonical text has
/// no tokens are not sent to the backend and get the zero vector, matching
/// the hashed path.
pub fn embed_documents(
    docs: &[PreparedDocument],
    embedder: &dyn Embedder,
    decimals: u32,
) -> EmbedderResult<Vec<DocEmbedding>> {
    docs.par_iter()
        .map(|doc| {
            let mut vector = embed_chunked(&doc.text, doc.tokens.is_empty(), embedder)?;
            round_components(&mut vector, decimals);
            Ok(DocEmbedding {
                doc_id: doc.meta.doc_id.clone(),
                vector,
            })
        })
        .collect()
}

fn embed_chunked(text: &str, no_tokens: bool, embedder: &dyn Embedder) -> EmbedderResult<Vec<f32>> {
    let dimension = embedder.dimension();
    let mut acc = vec![0.0; dimension];
    if no_tokens {
        return Ok(acc);
    }
    let chunks = chunk_text(text, MODEL_CHUNK_CHARS);
    let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
    for vector in embedder.embed_batch(&refs)? {
        if vector.len() != dimension {
            return Err(EmbedderError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        add_scaled(&mut acc, &vector, 1.0);
    }
    // Mean then normalize == normalize the sum.
    l2_normalize(&mut acc);
    Ok(acc)
}
