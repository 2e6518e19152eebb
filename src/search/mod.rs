//! Search layer facade.
//!
//! - **[`canonicalize`]**: NFC + whitespace canonicalization, snippets, chunking.
//! - **[`tokenize`]**: Latin/Greek token extraction and the stopword list.
//! - **[`vector`]**: Dot product (SIMD), normalization, rounding.
//! - **[`embedder`]**: The `Embedder` trait every backend implements.
//! - **[`hash_embedder`]**: Character n-gram feature hashing (default backend).
//! - **[`fastembed_embedder`]**: Multilingual E5 models via fastembed/ONNX.
//! - **[`embedder_registry`]**: Backend listing, availability and selection.
//! - **[`vocabulary`]**: Document frequencies and token embeddings.
//! - **[`doc_index`]**: Per-document preparation and embedding.
//! - **[`expansion`]**: Vocabulary nearest-neighbor query expansion.
//! - **[`ranker`]**: Query embedding, scoring and snippet selection.

pub mod canonicalize;
pub mod doc_index;
pub mod embedder;
pub mod embedder_registry;
pub mod expansion;
pub mod fastembed_embedder;
pub mod hash_embedder;
pub mod ranker;
pub mod tokenize;
pub mod vector;
pub mod vocabulary;
