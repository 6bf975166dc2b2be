//! Keyword search over catalog entries.

pub mod bm25;
pub mod tokenizer;

pub use bm25::{SearchHit, SearchIndex};
pub use tokenizer::Normalizer;
