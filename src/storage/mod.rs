//! Persistence: corpus/index JSONL files and published index generations.

pub mod index_store;
pub mod jsonl;
