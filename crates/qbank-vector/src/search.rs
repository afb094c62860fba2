//! Semantic search combining embedding generation with index queries.
//!
//! SearchService embeds the query text and asks the similarity index for
//! nearest neighbors. Uses dynamic dispatch so production code can supply
//! `ExternalModelEmbedder` while tests use `FallbackEmbedder`.

use std::sync::Arc;

use qbank_core::error::QbankError;

use crate::embedding::DynEmbeddingGenerator;
use crate::index::{Neighbor, SimilarityIndex};

/// Search engine over the similarity index.
pub struct SearchService {
    index: Arc<SimilarityIndex>,
    embedder: Arc<dyn DynEmbeddingGenerator>,
}

impl SearchService {
    /// Create a new search service with a shared index and embedding
    /// generator.
    pub fn new(index: Arc<SimilarityIndex>, embedder: Arc<dyn DynEmbeddingGenerator>) -> Self {
        Self { index, embedder }
    }

    /// Embed the query text and return up to `n` nearest records,
    /// ascending by distance.
    pub async fn search(&self, query: &str, n: usize) -> Result<Vec<Neighbor>, QbankError> {
        let vector = self.embedder.embed_boxed(query).await;
        self.index.query(&vector, n)
    }

    /// Ids of records whose distance to the embedded text is below
    /// `max_distance`, nearest first, at most `n`.
    pub async fn find_similar(
        &self,
        text: &str,
        max_distance: f64,
        n: usize,
    ) -> Result<Vec<String>, QbankError> {
        let neighbors = self.search(text, n).await?;
        Ok(neighbors
            .into_iter()
            .filter(|neighbor| neighbor.distance < max_distance)
            .map(|neighbor| neighbor.id)
            .collect())
    }

    /// Get a reference to the underlying similarity index.
    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;
    use qbank_storage::{Database, EmbeddingRepository};

    fn make_service() -> SearchService {
        let db = Arc::new(Database::in_memory().unwrap());
        let index =
            Arc::new(SimilarityIndex::open(Arc::new(EmbeddingRepository::new(db))).unwrap());
        SearchService::new(index, Arc::new(FallbackEmbedder::new()))
    }

    fn insert_text(service: &SearchService, id: &str, text: &str) {
        service
            .index()
            .upsert(id, FallbackEmbedder::vector_for(text), text)
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let service = make_service();
        assert!(service.search("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_finds_exact_match_first() {
        let service = make_service();
        insert_text(&service, "1", "The Indian Navy is the naval branch");
        insert_text(&service, "2", "Ollama runs large language models locally");

        let neighbors = service
            .search("The Indian Navy is the naval branch", 5)
            .await
            .unwrap();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].id, "1");
        assert!(neighbors[0].distance.abs() < 1e-6);
        assert!(neighbors[1].distance > neighbors[0].distance);
    }

    #[tokio::test]
    async fn test_search_respects_n() {
        let service = make_service();
        for i in 0..6 {
            insert_text(&service, &i.to_string(), &format!("document number {}", i));
        }
        let neighbors = service.search("document", 3).await.unwrap();
        assert_eq!(neighbors.len(), 3);
    }

    #[tokio::test]
    async fn test_find_similar_filters_by_distance() {
        let service = make_service();
        insert_text(&service, "same", "identical text");
        insert_text(&service, "other", "something else entirely different");

        let similar = service.find_similar("identical text", 0.3, 5).await.unwrap();
        assert_eq!(similar, vec!["same".to_string()]);
    }

    #[tokio::test]
    async fn test_find_similar_empty_when_nothing_close() {
        let service = make_service();
        insert_text(&service, "1", "completely unrelated corpus entry");

        let similar = service
            .find_similar("quantum chromodynamics lattice", 0.05, 5)
            .await
            .unwrap();
        assert!(similar.is_empty());
    }
}
