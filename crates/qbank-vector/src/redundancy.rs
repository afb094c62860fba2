//! Redundant-record detection over the similarity index.
//!
//! Scans every stored record, queries its nearest neighbors, and collects
//! the ids of all cross-pairs closer than a caller-supplied distance
//! threshold. The relation is symmetric: whichever record's scan discovers
//! a close pair, both ids are flagged.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use qbank_core::error::QbankError;

use crate::index::SimilarityIndex;

/// Detector for near-duplicate records.
///
/// Read-only against the index. Upserts or deletes racing an in-flight scan
/// are not isolated: each per-record query sees whatever the index holds at
/// that moment.
pub struct RedundancyDetector {
    index: Arc<SimilarityIndex>,
}

impl RedundancyDetector {
    pub fn new(index: Arc<SimilarityIndex>) -> Self {
        Self { index }
    }

    /// Find all records participating in a pair closer than `threshold`.
    ///
    /// Each record is queried for its `k` nearest neighbors; the first
    /// result (the record itself at distance ≈ 0) is discarded, and every
    /// remaining neighbor below the threshold flags both ids. `k` must be
    /// at least 2 to see anything beyond self; that is the caller's
    /// responsibility. An empty index yields an empty set.
    ///
    /// A failed per-record query is logged and skipped; the scan continues
    /// and returns the union of the successful records' pairs.
    pub fn find_redundant(
        &self,
        threshold: f64,
        k: usize,
    ) -> Result<HashSet<String>, QbankError> {
        let records = self.index.get_all()?;
        let mut redundant = HashSet::new();

        for record in &records {
            let neighbors = match self.index.query(&record.vector, k) {
                Ok(neighbors) => neighbors,
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Redundancy scan skipping record");
                    continue;
                }
            };

            // neighbors[0] is the record itself (distance ≈ 0).
            for neighbor in neighbors.iter().skip(1) {
                if neighbor.distance < threshold {
                    redundant.insert(record.id.clone());
                    redundant.insert(neighbor.id.clone());
                }
            }
        }

        debug!(
            scanned = records.len(),
            flagged = redundant.len(),
            threshold,
            k,
            "Redundancy scan complete"
        );
        Ok(redundant)
    }
}
