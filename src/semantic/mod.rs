//! Embedding-based classification support.
//!
//! - `embeddings`: embedding providers (remote and local)
//! - `cache`: per-category vectors with model-tag staleness
//! - `similarity`: cosine scoring with a stable tie-break

pub mod cache;
pub mod embeddings;
pub mod similarity;

pub use cache::CategoryEmbeddingCache;
pub use embeddings::{EmbeddingProvider, OpenAiEmbeddings};
pub use similarity::best_match;
