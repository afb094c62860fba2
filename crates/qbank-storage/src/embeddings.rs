//! Persistence for similarity-index entries.
//!
//! Vectors are stored as little-endian f32 blobs keyed by a TEXT id. The
//! `seq` column records insertion order so the in-memory index can break
//! distance ties deterministically after a restart. Upserting an existing id
//! replaces the vector and document but keeps the original seq.

use std::sync::Arc;

use qbank_core::error::QbankError;

use crate::db::Database;
use crate::repository::OptionalExt;

/// One persisted similarity-index entry.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEmbedding {
    pub id: String,
    pub vector: Vec<f32>,
    pub document: String,
    pub seq: u64,
}

/// Repository for the embeddings table.
pub struct EmbeddingRepository {
    db: Arc<Database>,
}

impl EmbeddingRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace the entry for `id`. Idempotent: upserting the same
    /// id and vector twice leaves the table in the same state as once.
    pub fn upsert(&self, id: &str, vector: &[f32], document: &str) -> Result<(), QbankError> {
        let blob = vector_to_blob(vector);
        self.db.with_conn(|conn| {
            let existing_seq: Option<i64> = conn
                .query_row("SELECT seq FROM embeddings WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|e| QbankError::Storage(e.to_string()))?;

            let seq = match existing_seq {
                Some(seq) => seq,
                None => {
                    conn.query_row(
                        "SELECT COALESCE(MAX(seq), 0) + 1 FROM embeddings",
                        [],
                        |row| row.get(0),
                    )
                    .map_err(|e| QbankError::Storage(e.to_string()))?
                }
            };

            conn.execute(
                "INSERT INTO embeddings (id, document, vector, dim, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (id) DO UPDATE SET
                     document = excluded.document,
                     vector = excluded.vector,
                     dim = excluded.dim",
                rusqlite::params![id, document, blob, vector.len() as i64, seq],
            )
            .map_err(|e| QbankError::Storage(format!("Failed to upsert embedding: {}", e)))?;
            Ok(())
        })
    }

    /// Remove the entry for `id`. Removing a missing id is a no-op.
    pub fn delete(&self, id: &str) -> Result<(), QbankError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM embeddings WHERE id = ?1", [id])
                .map_err(|e| QbankError::Storage(format!("Failed to delete embedding: {}", e)))?;
            Ok(())
        })
    }

    /// Load every entry, ordered by insertion sequence.
    pub fn load_all(&self) -> Result<Vec<StoredEmbedding>, QbankError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, document, vector, dim, seq FROM embeddings ORDER BY seq ASC")
                .map_err(|e| QbankError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    let id: String = row.get(0)?;
                    let document: String = row.get(1)?;
                    let blob: Vec<u8> = row.get(2)?;
                    let dim: i64 = row.get(3)?;
                    let seq: i64 = row.get(4)?;
                    Ok((id, document, blob, dim, seq))
                })
                .map_err(|e| QbankError::Storage(e.to_string()))?;

            let mut entries = Vec::new();
            for row in rows {
                let (id, document, blob, dim, seq) =
                    row.map_err(|e| QbankError::Storage(e.to_string()))?;
                let vector = blob_to_vector(&blob)?;
                if vector.len() != dim as usize {
                    return Err(QbankError::Storage(format!(
                        "Corrupt embedding for id {}: blob holds {} values, dim column says {}",
                        id,
                        vector.len(),
                        dim
                    )));
                }
                entries.push(StoredEmbedding {
                    id,
                    vector,
                    document,
                    seq: seq as u64,
                });
            }
            Ok(entries)
        })
    }

    /// Count persisted entries.
    pub fn count(&self) -> Result<u64, QbankError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
                .map_err(|e| QbankError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_vector(blob: &[u8]) -> Result<Vec<f32>, QbankError> {
    if blob.len() % 4 != 0 {
        return Err(QbankError::Storage(format!(
            "Corrupt embedding blob: {} bytes is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_repo() -> EmbeddingRepository {
        EmbeddingRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[test]
    fn test_upsert_and_load() {
        let repo = make_repo();
        repo.upsert("q-1", &[0.5, -1.25, 3.0], "doc one").unwrap();

        let all = repo.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "q-1");
        assert_eq!(all[0].vector, vec![0.5, -1.25, 3.0]);
        assert_eq!(all[0].document, "doc one");
        assert_eq!(all[0].seq, 1);
    }

    #[test]
    fn test_upsert_replaces_but_keeps_seq() {
        let repo = make_repo();
        repo.upsert("a", &[1.0], "first").unwrap();
        repo.upsert("b", &[2.0], "second").unwrap();
        repo.upsert("a", &[9.0], "replaced").unwrap();

        let all = repo.load_all().unwrap();
        assert_eq!(all.len(), 2);
        // "a" keeps seq 1 and therefore still loads first.
        assert_eq!(all[0].id, "a");
        assert_eq!(all[0].vector, vec![9.0]);
        assert_eq!(all[0].document, "replaced");
        assert_eq!(all[0].seq, 1);
        assert_eq!(all[1].seq, 2);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let repo = make_repo();
        repo.upsert("a", &[1.0, 2.0], "doc").unwrap();
        let before = repo.load_all().unwrap();

        repo.upsert("a", &[1.0, 2.0], "doc").unwrap();
        let after = repo.load_all().unwrap();

        assert_eq!(before, after);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_delete() {
        let repo = make_repo();
        repo.upsert("a", &[1.0], "doc").unwrap();
        repo.delete("a").unwrap();
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_delete_nonexistent_is_noop() {
        let repo = make_repo();
        repo.delete("missing").unwrap();
    }

    #[test]
    fn test_load_all_ordered_by_seq() {
        let repo = make_repo();
        for i in 0..5 {
            repo.upsert(&format!("id-{}", i), &[i as f32], "").unwrap();
        }
        let all = repo.load_all().unwrap();
        let seqs: Vec<u64> = all.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_blob_round_trip() {
        let vector = vec![0.0f32, 1.5, -2.75, f32::MIN_POSITIVE];
        let blob = vector_to_blob(&vector);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_vector(&blob).unwrap(), vector);
    }

    #[test]
    fn test_blob_bad_length() {
        assert!(blob_to_vector(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qbank.db");

        {
            let db = Arc::new(Database::new(&path).unwrap());
            let repo = EmbeddingRepository::new(db);
            repo.upsert("42", &[0.1, 0.2], "persisted doc").unwrap();
        }

        let db = Arc::new(Database::new(&path).unwrap());
        let repo = EmbeddingRepository::new(db);
        let all = repo.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "42");
        assert_eq!(all[0].document, "persisted doc");
    }
}
