//! Application state shared across all route handlers.
//!
//! AppState holds references to all services and shared resources. Every
//! service is explicitly constructed and injected; there is no ambient
//! global client. It is passed to handlers via axum's State extractor.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use qbank_core::config::QbankConfig;
use qbank_export::Exporter;
use qbank_storage::{Database, QuestionRepository};
use qbank_vector::{DynEmbeddingGenerator, RedundancyDetector, SearchService, SimilarityIndex};

use crate::generate::QuestionGenerator;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
/// Mutable state is protected by `Mutex`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Mutex<QbankConfig>>,
    /// SQLite database for persistent storage.
    pub database: Arc<Database>,
    /// Repository over the questions and tags tables.
    pub questions: Arc<QuestionRepository>,
    /// Persistent similarity index.
    pub index: Arc<SimilarityIndex>,
    /// Embedding generator feeding the index.
    pub embedder: Arc<dyn DynEmbeddingGenerator>,
    /// Redundant-question detector over the index.
    pub detector: Arc<RedundancyDetector>,
    /// Semantic search over the index.
    pub search: Arc<SearchService>,
    /// File exporter for question sets.
    pub exporter: Arc<Exporter>,
    /// Optional question-generation service; absent unless configured.
    pub generator: Option<Arc<dyn QuestionGenerator>>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState wiring repositories and services around the
    /// given database, index, and embedder.
    pub fn new(
        config: QbankConfig,
        database: Arc<Database>,
        index: Arc<SimilarityIndex>,
        embedder: Arc<dyn DynEmbeddingGenerator>,
        exporter: Exporter,
    ) -> Self {
        let questions = Arc::new(QuestionRepository::new(Arc::clone(&database)));
        let detector = Arc::new(RedundancyDetector::new(Arc::clone(&index)));
        let search = Arc::new(SearchService::new(
            Arc::clone(&index),
            Arc::clone(&embedder),
        ));

        Self {
            config: Arc::new(Mutex::new(config)),
            database,
            questions,
            index,
            embedder,
            detector,
            search,
            exporter: Arc::new(exporter),
            generator: None,
            start_time: Instant::now(),
        }
    }

    /// Attach a question-generation service.
    pub fn with_generator(mut self, generator: Arc<dyn QuestionGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }
}
