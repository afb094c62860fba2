//! Repository for SQLite-backed question persistence.
//!
//! QuestionRepository operates on the Database struct using raw SQL and
//! owns the questions and tags tables.

use std::sync::Arc;

use rusqlite::types::ToSql;

use qbank_core::error::QbankError;
use qbank_core::types::{NewQuestion, Question, QuestionUpdate};

use crate::db::Database;

/// Filter criteria for question listing. Text fields use substring matching;
/// `tags` matches questions carrying ANY of the given tags.
#[derive(Clone, Debug, Default)]
pub struct QuestionFilter {
    pub tags: Option<Vec<String>>,
    pub difficulty: Option<String>,
    pub language: Option<String>,
    pub question_type: Option<String>,
    pub limit: Option<u64>,
    pub offset: u64,
}

const BASE_SELECT: &str = "SELECT q.question_id, q.question, q.difficulty, q.language,
            q.image_required, q.question_type, q.solution,
            GROUP_CONCAT(DISTINCT t.tag) AS tags
     FROM questions q
     LEFT JOIN tags t ON q.question_id = t.question_id";

/// Repository for question rows and their tags.
pub struct QuestionRepository {
    db: Arc<Database>,
}

impl QuestionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new question with its tags. Returns the assigned id.
    pub fn insert(&self, question: &NewQuestion) -> Result<i64, QbankError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO questions (question, difficulty, language, image_required, question_type, solution)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    question.question,
                    question.difficulty.as_str(),
                    question.language,
                    question.image_required as i64,
                    question.question_type.as_str(),
                    question.solution,
                ],
            )
            .map_err(|e| QbankError::Storage(format!("Failed to insert question: {}", e)))?;

            let question_id = conn.last_insert_rowid();
            insert_tags(conn, question_id, &question.tags)?;
            Ok(question_id)
        })
    }

    /// Find a question by id, with its tags.
    pub fn find_by_id(&self, id: i64) -> Result<Option<Question>, QbankError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT question_id, question, difficulty, language, image_required, question_type, solution
                     FROM questions WHERE question_id = ?1",
                )
                .map_err(|e| QbankError::Storage(e.to_string()))?;

            let result = stmt
                .query_row([id], |row| Ok(row_to_question(row)))
                .optional()
                .map_err(|e| QbankError::Storage(e.to_string()))?;

            let mut question = match result {
                Some(q) => q?,
                None => return Ok(None),
            };

            question.tags = load_tags(conn, id)?;
            Ok(Some(question))
        })
    }

    /// Fetch multiple questions by id in a single query. Missing ids are
    /// silently absent from the result; ordering is by id descending.
    pub fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Question>, QbankError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "{} WHERE q.question_id IN ({})
             GROUP BY q.question_id
             ORDER BY q.question_id DESC",
            BASE_SELECT, placeholders
        );

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| QbankError::Storage(e.to_string()))?;
            collect_questions(stmt.query_map(
                rusqlite::params_from_iter(ids.iter()),
                map_tagged_row,
            ))
        })
    }

    /// Apply a partial update. Returns false when the question does not exist.
    ///
    /// `Some(tags)` replaces the complete tag set; `None` leaves tags alone.
    pub fn update(&self, id: i64, update: &QuestionUpdate) -> Result<bool, QbankError> {
        self.db.with_conn(|conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT question_id FROM questions WHERE question_id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| QbankError::Storage(e.to_string()))?;
            if exists.is_none() {
                return Ok(false);
            }

            let mut set_parts: Vec<&str> = Vec::new();
            let mut values: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(ref question) = update.question {
                set_parts.push("question = ?");
                values.push(Box::new(question.clone()));
            }
            if let Some(question_type) = update.question_type {
                set_parts.push("question_type = ?");
                values.push(Box::new(question_type.as_str().to_string()));
            }
            if let Some(ref solution) = update.solution {
                set_parts.push("solution = ?");
                values.push(Box::new(solution.clone()));
            }
            if let Some(difficulty) = update.difficulty {
                set_parts.push("difficulty = ?");
                values.push(Box::new(difficulty.as_str().to_string()));
            }
            if let Some(ref language) = update.language {
                set_parts.push("language = ?");
                values.push(Box::new(language.clone()));
            }
            if let Some(image_required) = update.image_required {
                set_parts.push("image_required = ?");
                values.push(Box::new(image_required as i64));
            }

            if !set_parts.is_empty() {
                let sql = format!(
                    "UPDATE questions SET {} WHERE question_id = ?",
                    set_parts.join(", ")
                );
                values.push(Box::new(id));
                conn.execute(
                    &sql,
                    rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
                )
                .map_err(|e| QbankError::Storage(format!("Failed to update question: {}", e)))?;
            }

            if let Some(ref tags) = update.tags {
                conn.execute("DELETE FROM tags WHERE question_id = ?1", [id])
                    .map_err(|e| QbankError::Storage(e.to_string()))?;
                insert_tags(conn, id, tags)?;
            }

            Ok(true)
        })
    }

    /// Delete a question; its tags cascade. Deleting a missing id is a no-op.
    pub fn delete(&self, id: i64) -> Result<(), QbankError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM questions WHERE question_id = ?1", [id])
                .map_err(|e| QbankError::Storage(format!("Failed to delete question: {}", e)))?;
            Ok(())
        })
    }

    /// List questions with tags, newest first, with optional pagination.
    pub fn list(&self, limit: Option<u64>, offset: u64) -> Result<Vec<Question>, QbankError> {
        let mut sql = format!(
            "{} GROUP BY q.question_id ORDER BY q.question_id DESC",
            BASE_SELECT
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if offset > 0 {
            // OFFSET requires a LIMIT clause in SQLite.
            if limit.is_none() {
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| QbankError::Storage(e.to_string()))?;
            collect_questions(stmt.query_map([], map_tagged_row))
        })
    }

    /// Filter questions by tags / difficulty / language / type.
    pub fn filter(&self, filter: &QuestionFilter) -> Result<Vec<Question>, QbankError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(ref difficulty) = filter.difficulty {
            conditions.push("q.difficulty LIKE ?".to_string());
            params.push(format!("%{}%", difficulty));
        }
        if let Some(ref language) = filter.language {
            conditions.push("q.language LIKE ?".to_string());
            params.push(format!("%{}%", language));
        }
        if let Some(ref question_type) = filter.question_type {
            conditions.push("q.question_type LIKE ?".to_string());
            params.push(format!("%{}%", question_type));
        }
        if let Some(ref tags) = filter.tags {
            if !tags.is_empty() {
                let placeholders = vec!["?"; tags.len()].join(",");
                conditions.push(format!(
                    "EXISTS (SELECT 1 FROM tags t2
                             WHERE t2.question_id = q.question_id AND t2.tag IN ({}))",
                    placeholders
                ));
                params.extend(tags.iter().cloned());
            }
        }

        let mut sql = String::from(BASE_SELECT);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" GROUP BY q.question_id ORDER BY q.question_id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if filter.offset > 0 {
            if filter.limit.is_none() {
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {}", filter.offset));
        }

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| QbankError::Storage(e.to_string()))?;
            collect_questions(stmt.query_map(
                rusqlite::params_from_iter(params.iter()),
                map_tagged_row,
            ))
        })
    }

    /// Keyword search across question text, solution, difficulty, type, and
    /// tags. Results are ordered by match location: question body first, then
    /// solution, then tags.
    pub fn search(&self, query: &str, limit: u64) -> Result<Vec<Question>, QbankError> {
        let pattern = format!("%{}%", query);
        let sql = format!(
            "SELECT q.question_id, q.question, q.difficulty, q.language,
                    q.image_required, q.question_type, q.solution,
                    GROUP_CONCAT(DISTINCT t.tag) AS tags,
                    CASE
                        WHEN q.question LIKE ?1 THEN 1
                        WHEN q.solution LIKE ?2 THEN 2
                        WHEN EXISTS (SELECT 1 FROM tags t2
                                     WHERE t2.question_id = q.question_id
                                       AND t2.tag LIKE ?3) THEN 3
                        ELSE 4
                    END AS match_priority
             FROM questions q
             LEFT JOIN tags t ON q.question_id = t.question_id
             WHERE q.question LIKE ?4
                OR q.solution LIKE ?5
                OR q.difficulty LIKE ?6
                OR q.question_type LIKE ?7
                OR EXISTS (SELECT 1 FROM tags t3
                           WHERE t3.question_id = q.question_id AND t3.tag LIKE ?8)
             GROUP BY q.question_id
             ORDER BY match_priority, q.question_id DESC
             LIMIT {}",
            limit
        );

        let params = vec![pattern; 8];
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| QbankError::Storage(e.to_string()))?;
            collect_questions(stmt.query_map(
                rusqlite::params_from_iter(params.iter()),
                map_tagged_row,
            ))
        })
    }

    /// Count all questions.
    pub fn count(&self) -> Result<u64, QbankError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))
                .map_err(|e| QbankError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

// ============================================================================
// Helper functions for row-to-entity conversion.
// ============================================================================

fn insert_tags(
    conn: &rusqlite::Connection,
    question_id: i64,
    tags: &[String],
) -> Result<(), QbankError> {
    if tags.is_empty() {
        return Ok(());
    }
    let mut stmt = conn
        .prepare("INSERT INTO tags (question_id, tag) VALUES (?1, ?2)")
        .map_err(|e| QbankError::Storage(e.to_string()))?;
    for tag in tags {
        stmt.execute(rusqlite::params![question_id, tag])
            .map_err(|e| QbankError::Storage(format!("Failed to insert tag: {}", e)))?;
    }
    Ok(())
}

fn load_tags(conn: &rusqlite::Connection, question_id: i64) -> Result<Vec<String>, QbankError> {
    let mut stmt = conn
        .prepare("SELECT tag FROM tags WHERE question_id = ?1 ORDER BY id")
        .map_err(|e| QbankError::Storage(e.to_string()))?;
    let rows = stmt
        .query_map([question_id], |row| row.get::<_, String>(0))
        .map_err(|e| QbankError::Storage(e.to_string()))?;

    let mut tags = Vec::new();
    for row in rows {
        tags.push(row.map_err(|e| QbankError::Storage(e.to_string()))?);
    }
    Ok(tags)
}

/// Map a row from the base question columns. Tags start empty; callers fill
/// them from a separate query or a GROUP_CONCAT column.
fn row_to_question(row: &rusqlite::Row<'_>) -> Result<Question, QbankError> {
    let question_id: i64 = row.get(0).map_err(|e| QbankError::Storage(e.to_string()))?;
    let question: String = row.get(1).map_err(|e| QbankError::Storage(e.to_string()))?;
    let difficulty_str: String = row.get(2).map_err(|e| QbankError::Storage(e.to_string()))?;
    let language: String = row.get(3).map_err(|e| QbankError::Storage(e.to_string()))?;
    let image_required: i64 = row.get(4).map_err(|e| QbankError::Storage(e.to_string()))?;
    let type_str: String = row.get(5).map_err(|e| QbankError::Storage(e.to_string()))?;
    let solution: String = row.get(6).map_err(|e| QbankError::Storage(e.to_string()))?;

    Ok(Question {
        question_id,
        question,
        question_type: type_str.parse()?,
        solution,
        difficulty: difficulty_str.parse()?,
        tags: Vec::new(),
        language,
        image_required: image_required != 0,
    })
}

/// Row mapper for queries that include a GROUP_CONCAT tags column at index 7.
fn map_tagged_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Question, QbankError>> {
    let tags_concat: Option<String> = row.get(7)?;
    Ok(row_to_question(row).map(|mut question| {
        if let Some(concat) = tags_concat {
            question.tags = concat
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        question
    }))
}

/// Drain a query_map result into a question list, flattening both error layers.
fn collect_questions<F>(
    rows: rusqlite::Result<rusqlite::MappedRows<'_, F>>,
) -> Result<Vec<Question>, QbankError>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<Result<Question, QbankError>>,
{
    let rows = rows.map_err(|e| QbankError::Storage(e.to_string()))?;
    let mut questions = Vec::new();
    for row in rows {
        let question = row.map_err(|e| QbankError::Storage(e.to_string()))??;
        questions.push(question);
    }
    Ok(questions)
}

/// Extension trait for rusqlite to support optional query results.
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
