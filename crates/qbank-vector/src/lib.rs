//! qbank vector crate - embedding generation, similarity index, redundancy
//! detection, and semantic search.
//!
//! Provides a persistent Euclidean nearest-neighbor index keyed by string
//! record ids, an embedding generator trait with a deterministic fallback
//! and an ONNX-backed external model, a redundancy detector that flags
//! near-duplicate records pairwise, and a search service for queries.

pub mod embedding;
pub mod index;
pub mod redundancy;
pub mod search;

pub use embedding::{
    DynEmbeddingGenerator, EmbeddingGenerator, ExternalModelEmbedder, FallbackEmbedder,
    EMBEDDING_DIM,
};
pub use index::{euclidean_distance, IndexRecord, Neighbor, SimilarityIndex};
pub use redundancy::RedundancyDetector;
pub use search::SearchService;
