//! qbank storage crate - SQLite persistence for questions, tags, and
//! similarity-index entries.
//!
//! Provides a WAL-mode SQLite database with migrations, a repository for
//! question rows and their tags, a write-through store for embedding
//! vectors, and aggregate statistics queries.

pub mod db;
pub mod embeddings;
pub mod migrations;
pub mod queries;
pub mod repository;

pub use db::Database;
pub use embeddings::{EmbeddingRepository, StoredEmbedding};
pub use queries::{get_all_tags, get_stats, get_unique_values, FilterField};
pub use repository::{QuestionFilter, QuestionRepository};
