//! Aggregate queries over the question bank: statistics and filter options.

use qbank_core::error::QbankError;
use qbank_core::types::{QuestionStats, TagCount};

use crate::db::Database;

/// A question column with a small, known value set, used for filter options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterField {
    Difficulty,
    Language,
    QuestionType,
}

impl FilterField {
    fn column(&self) -> &'static str {
        match self {
            FilterField::Difficulty => "difficulty",
            FilterField::Language => "language",
            FilterField::QuestionType => "question_type",
        }
    }
}

/// Distinct non-empty values of the given question column, ascending.
pub fn get_unique_values(db: &Database, field: FilterField) -> Result<Vec<String>, QbankError> {
    let sql = format!(
        "SELECT DISTINCT {col} FROM questions
         WHERE {col} IS NOT NULL AND {col} != ''
         ORDER BY {col}",
        col = field.column()
    );
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| QbankError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| QbankError::Storage(e.to_string()))?;

        let mut values = Vec::new();
        for row in rows {
            values.push(row.map_err(|e| QbankError::Storage(e.to_string()))?);
        }
        Ok(values)
    })
}

/// All distinct non-empty tags, ascending.
pub fn get_all_tags(db: &Database) -> Result<Vec<String>, QbankError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT tag FROM tags
                 WHERE tag IS NOT NULL AND tag != ''
                 ORDER BY tag",
            )
            .map_err(|e| QbankError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| QbankError::Storage(e.to_string()))?;

        let mut tags = Vec::new();
        for row in rows {
            tags.push(row.map_err(|e| QbankError::Storage(e.to_string()))?);
        }
        Ok(tags)
    })
}

/// Aggregate statistics: totals, per-difficulty/type/language counts,
/// the ten most popular tags, and the full topic list.
pub fn get_stats(db: &Database) -> Result<QuestionStats, QbankError> {
    db.with_conn(|conn| {
        let mut stats = QuestionStats::default();

        stats.total_questions = conn
            .query_row("SELECT COUNT(*) FROM questions", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(|e| QbankError::Storage(e.to_string()))? as u64;

        for (sql, target) in [
            (
                "SELECT difficulty, COUNT(*) FROM questions GROUP BY difficulty",
                &mut stats.difficulties,
            ),
            (
                "SELECT question_type, COUNT(*) FROM questions GROUP BY question_type",
                &mut stats.question_types,
            ),
            (
                "SELECT language, COUNT(*) FROM questions
                 WHERE language IS NOT NULL GROUP BY language",
                &mut stats.languages,
            ),
        ] {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| QbankError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .map_err(|e| QbankError::Storage(e.to_string()))?;
            for row in rows {
                let (key, count) = row.map_err(|e| QbankError::Storage(e.to_string()))?;
                target.insert(key, count as u64);
            }
        }

        let mut stmt = conn
            .prepare(
                "SELECT tag, COUNT(*) AS count FROM tags
                 WHERE tag IS NOT NULL AND tag != ''
                 GROUP BY tag
                 ORDER BY count DESC, tag
                 LIMIT 10",
            )
            .map_err(|e| QbankError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TagCount {
                    tag: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })
            .map_err(|e| QbankError::Storage(e.to_string()))?;
        for row in rows {
            stats
                .popular_tags
                .push(row.map_err(|e| QbankError::Storage(e.to_string()))?);
        }

        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT tag FROM tags
                 WHERE tag IS NOT NULL AND tag != ''
                 ORDER BY tag",
            )
            .map_err(|e| QbankError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| QbankError::Storage(e.to_string()))?;
        for row in rows {
            stats
                .topics
                .push(row.map_err(|e| QbankError::Storage(e.to_string()))?);
        }

        Ok(stats)
    })
}
