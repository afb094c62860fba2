//! Database schema migrations.
//!
//! Applies the initial schema: questions, tags, embeddings, and the
//! schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use qbank_core::error::QbankError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), QbankError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| QbankError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| QbankError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), QbankError> {
    conn.execute_batch(
        "
        -- Question bank rows.
        CREATE TABLE IF NOT EXISTS questions (
            question_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            question        TEXT NOT NULL,
            difficulty      TEXT NOT NULL
                            CHECK (difficulty IN ('Easy', 'Medium', 'Hard')),
            language        TEXT NOT NULL DEFAULT 'English',
            image_required  INTEGER NOT NULL DEFAULT 0,
            question_type   TEXT NOT NULL
                            CHECK (question_type IN
                                ('MCQ', 'Short Answer', 'Long Answer', 'oneword', 'True/False')),
            solution        TEXT NOT NULL DEFAULT '',
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_questions_difficulty
            ON questions (difficulty);

        CREATE INDEX IF NOT EXISTS idx_questions_type
            ON questions (question_type);

        CREATE INDEX IF NOT EXISTS idx_questions_language
            ON questions (language);

        -- Tags, many per question.
        CREATE TABLE IF NOT EXISTS tags (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            question_id     INTEGER NOT NULL
                            REFERENCES questions (question_id) ON DELETE CASCADE,
            tag             TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tags_question
            ON tags (question_id);

        CREATE INDEX IF NOT EXISTS idx_tags_tag
            ON tags (tag);

        -- Persisted similarity-index entries. Vectors are little-endian f32
        -- blobs; seq preserves insertion order for stable distance tie-breaks.
        CREATE TABLE IF NOT EXISTS embeddings (
            id              TEXT PRIMARY KEY NOT NULL,
            document        TEXT NOT NULL DEFAULT '',
            vector          BLOB NOT NULL,
            dim             INTEGER NOT NULL,
            seq             INTEGER NOT NULL,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_embeddings_seq
            ON embeddings (seq);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| QbankError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_create_tables() {
        let conn = open_conn();
        run_migrations(&conn).unwrap();

        for table in ["questions", "tags", "embeddings", "schema_migrations"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "table {} missing", table);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = open_conn();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_difficulty_check_constraint() {
        let conn = open_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO questions (question, difficulty, question_type, solution)
             VALUES ('q', 'Impossible', 'MCQ', 's')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_tags_cascade_on_question_delete() {
        let conn = open_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO questions (question, difficulty, question_type, solution)
             VALUES ('q', 'Easy', 'MCQ', 's')",
            [],
        )
        .unwrap();
        let qid = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO tags (question_id, tag) VALUES (?1, 'navy')",
            [qid],
        )
        .unwrap();

        conn.execute("DELETE FROM questions WHERE question_id = ?1", [qid])
            .unwrap();

        let tag_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tag_count, 0);
    }
}
