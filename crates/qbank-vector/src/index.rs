//! Persistent similarity index with brute-force Euclidean nearest-neighbor
//! search.
//!
//! The index keeps all vectors in memory for querying and writes every
//! mutation through to the embeddings table, so it survives process
//! restarts. All operations are O(n) for search, which is acceptable for
//! moderate dataset sizes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use qbank_core::error::QbankError;
use qbank_storage::EmbeddingRepository;

/// A single neighbor returned from a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Identifier of the stored record.
    pub id: String,
    /// Euclidean distance to the query vector (lower = more similar).
    pub distance: f64,
}

/// A full record from the index, as returned by [`SimilarityIndex::get_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub document: String,
}

/// An entry held in memory.
#[derive(Debug, Clone)]
struct IndexEntry {
    vector: Vec<f32>,
    document: String,
    seq: u64,
}

/// Persistent nearest-neighbor store keyed by string record identifier.
///
/// Identifiers are strings at this boundary; numeric caller ids are
/// converted at the edge. Distance ties are broken by insertion order,
/// which is preserved across restarts via the persisted `seq` column.
/// Mutating the index while a scan is iterating it is not isolated: the
/// scan observes whichever entries each individual query sees.
pub struct SimilarityIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
    next_seq: AtomicU64,
    store: Arc<EmbeddingRepository>,
}

impl SimilarityIndex {
    /// Open the index, hydrating the in-memory map from the backing store.
    pub fn open(store: Arc<EmbeddingRepository>) -> Result<Self, QbankError> {
        let persisted = store
            .load_all()
            .map_err(|e| QbankError::IndexUnavailable(e.to_string()))?;

        let mut entries = HashMap::with_capacity(persisted.len());
        let mut max_seq = 0;
        for stored in persisted {
            max_seq = max_seq.max(stored.seq);
            entries.insert(
                stored.id,
                IndexEntry {
                    vector: stored.vector,
                    document: stored.document,
                    seq: stored.seq,
                },
            );
        }

        info!(entries = entries.len(), "Similarity index hydrated");

        Ok(Self {
            entries: RwLock::new(entries),
            next_seq: AtomicU64::new(max_seq + 1),
            store,
        })
    }

    /// Insert or replace the record for `id`.
    ///
    /// Idempotent: upserting the same id and vector twice yields the same
    /// observable state as once. Replacing an existing id keeps its
    /// insertion-order position.
    pub fn upsert(&self, id: &str, vector: Vec<f32>, document: &str) -> Result<(), QbankError> {
        self.store
            .upsert(id, &vector, document)
            .map_err(|e| QbankError::IndexUnavailable(e.to_string()))?;

        let mut entries = self
            .entries
            .write()
            .map_err(|e| QbankError::IndexUnavailable(format!("Lock poisoned: {}", e)))?;
        let seq = match entries.get(id) {
            Some(existing) => existing.seq,
            None => self.next_seq.fetch_add(1, Ordering::SeqCst),
        };
        entries.insert(
            id.to_string(),
            IndexEntry {
                vector,
                document: document.to_string(),
                seq,
            },
        );
        Ok(())
    }

    /// Remove the record for `id`. Deleting a non-existent id is a no-op.
    pub fn delete(&self, id: &str) -> Result<(), QbankError> {
        self.store
            .delete(id)
            .map_err(|e| QbankError::IndexUnavailable(e.to_string()))?;

        let mut entries = self
            .entries
            .write()
            .map_err(|e| QbankError::IndexUnavailable(format!("Lock poisoned: {}", e)))?;
        entries.remove(id);
        Ok(())
    }

    /// Return up to `k` nearest stored records by Euclidean distance,
    /// ascending, ties broken by insertion order. Querying a stored
    /// record's own vector returns that record first with distance ≈ 0.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>, QbankError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| QbankError::IndexUnavailable(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<(f64, u64, &String)> = entries
            .iter()
            .map(|(id, entry)| (euclidean_distance(vector, &entry.vector), entry.seq, id))
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, _, id)| Neighbor {
                id: id.clone(),
                distance,
            })
            .collect())
    }

    /// Full scan of all stored records, in insertion order.
    pub fn get_all(&self) -> Result<Vec<IndexRecord>, QbankError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| QbankError::IndexUnavailable(format!("Lock poisoned: {}", e)))?;

        let mut records: Vec<(u64, IndexRecord)> = entries
            .iter()
            .map(|(id, entry)| {
                (
                    entry.seq,
                    IndexRecord {
                        id: id.clone(),
                        vector: entry.vector.clone(),
                        document: entry.document.clone(),
                    },
                )
            })
            .collect();
        records.sort_by_key(|(seq, _)| *seq);

        Ok(records.into_iter().map(|(_, record)| record).collect())
    }

    /// Number of records currently stored in the index.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// True if the index contains no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SimilarityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityIndex")
            .field("len", &self.len())
            .finish()
    }
}

/// Euclidean (L2) distance between two vectors.
///
/// Symmetric, non-negative, zero for identical inputs. Vectors of different
/// lengths compare as infinitely far apart.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
