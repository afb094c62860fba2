use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QbankError;

// =============================================================================
// Enums
// =============================================================================

/// Difficulty level of a question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// The canonical text stored in the database and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    /// All difficulty levels in ascending order.
    pub fn all() -> [Difficulty; 3] {
        [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = QbankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(QbankError::Serialization(format!(
                "Unknown difficulty: {}",
                other
            ))),
        }
    }
}

/// The answer format of a question.
///
/// Wire strings match the historical API values exactly, including the
/// lowercase "oneword" and slashed "True/False".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "MCQ")]
    Mcq,
    #[serde(rename = "Short Answer")]
    ShortAnswer,
    #[serde(rename = "Long Answer")]
    LongAnswer,
    #[serde(rename = "oneword")]
    OneWord,
    #[serde(rename = "True/False")]
    TrueFalse,
}

impl QuestionType {
    /// The canonical text stored in the database and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Mcq => "MCQ",
            QuestionType::ShortAnswer => "Short Answer",
            QuestionType::LongAnswer => "Long Answer",
            QuestionType::OneWord => "oneword",
            QuestionType::TrueFalse => "True/False",
        }
    }

    /// All question types.
    pub fn all() -> [QuestionType; 5] {
        [
            QuestionType::Mcq,
            QuestionType::ShortAnswer,
            QuestionType::LongAnswer,
            QuestionType::OneWord,
            QuestionType::TrueFalse,
        ]
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = QbankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MCQ" => Ok(QuestionType::Mcq),
            "Short Answer" => Ok(QuestionType::ShortAnswer),
            "Long Answer" => Ok(QuestionType::LongAnswer),
            "oneword" => Ok(QuestionType::OneWord),
            "True/False" => Ok(QuestionType::TrueFalse),
            other => Err(QbankError::Serialization(format!(
                "Unknown question type: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Question records
// =============================================================================

fn default_language() -> String {
    "English".to_string()
}

/// A question as submitted for creation, before an id is assigned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub question: String,
    pub question_type: QuestionType,
    pub solution: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub image_required: bool,
}

impl NewQuestion {
    /// The canonical text representation used to derive the similarity
    /// embedding: question body, solution, and tags concatenated.
    pub fn embedding_text(&self) -> String {
        format!(
            "Question: {} Solution: {} Tags: {}",
            self.question,
            self.solution,
            self.tags.join(", ")
        )
    }

    /// Promote to a stored question once an id has been assigned.
    pub fn with_id(self, question_id: i64) -> Question {
        Question {
            question_id,
            question: self.question,
            question_type: self.question_type,
            solution: self.solution,
            difficulty: self.difficulty,
            tags: self.tags,
            language: self.language,
            image_required: self.image_required,
        }
    }
}

/// A stored question with its assigned identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: i64,
    pub question: String,
    pub question_type: QuestionType,
    pub solution: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub image_required: bool,
}

impl Question {
    /// The canonical text representation used to derive the similarity
    /// embedding. Must stay in sync with [`NewQuestion::embedding_text`]
    /// so re-embedding after an update is idempotent for unchanged rows.
    pub fn embedding_text(&self) -> String {
        format!(
            "Question: {} Solution: {} Tags: {}",
            self.question,
            self.solution,
            self.tags.join(", ")
        )
    }
}

/// Partial update of a stored question. `None` fields are left untouched;
/// `Some(tags)` replaces the full tag set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionUpdate {
    pub question: Option<String>,
    pub question_type: Option<QuestionType>,
    pub solution: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub tags: Option<Vec<String>>,
    pub language: Option<String>,
    pub image_required: Option<bool>,
}

impl QuestionUpdate {
    /// True when no field is set, i.e. the update would be a no-op.
    pub fn is_empty(&self) -> bool {
        self.question.is_none()
            && self.question_type.is_none()
            && self.solution.is_none()
            && self.difficulty.is_none()
            && self.tags.is_none()
            && self.language.is_none()
            && self.image_required.is_none()
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Aggregate statistics over the question bank.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionStats {
    pub total_questions: u64,
    /// Count per difficulty, keyed by canonical name.
    pub difficulties: BTreeMap<String, u64>,
    /// Count per question type, keyed by canonical name.
    pub question_types: BTreeMap<String, u64>,
    /// Count per language.
    pub languages: BTreeMap<String, u64>,
    /// Most frequently used tags with their counts, descending.
    pub popular_tags: Vec<TagCount>,
    /// All distinct tags, ascending.
    pub topics: Vec<String>,
}

/// A tag together with how many questions carry it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_type_wire_strings() {
        assert_eq!(
            serde_json::to_string(&QuestionType::Mcq).unwrap(),
            "\"MCQ\""
        );
        assert_eq!(
            serde_json::to_string(&QuestionType::ShortAnswer).unwrap(),
            "\"Short Answer\""
        );
        assert_eq!(
            serde_json::to_string(&QuestionType::OneWord).unwrap(),
            "\"oneword\""
        );
        assert_eq!(
            serde_json::to_string(&QuestionType::TrueFalse).unwrap(),
            "\"True/False\""
        );
    }

    #[test]
    fn test_question_type_round_trip() {
        for qt in QuestionType::all() {
            let parsed: QuestionType = qt.as_str().parse().unwrap();
            assert_eq!(parsed, qt);
        }
    }

    #[test]
    fn test_difficulty_round_trip() {
        for d in Difficulty::all() {
            let parsed: Difficulty = d.as_str().parse().unwrap();
            assert_eq!(parsed, d);
        }
    }

    #[test]
    fn test_difficulty_parse_case_insensitive() {
        assert_eq!("easy".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert_eq!("MEDIUM".parse::<Difficulty>().unwrap(), Difficulty::Medium);
        assert!("impossible".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_new_question_defaults() {
        let json = r#"{
            "question": "What is the capital of France?",
            "question_type": "oneword",
            "solution": "Paris",
            "difficulty": "Easy"
        }"#;
        let q: NewQuestion = serde_json::from_str(json).unwrap();
        assert_eq!(q.language, "English");
        assert!(!q.image_required);
        assert!(q.tags.is_empty());
    }

    #[test]
    fn test_embedding_text_format() {
        let q = NewQuestion {
            question: "What is 2+2?".to_string(),
            question_type: QuestionType::OneWord,
            solution: "4".to_string(),
            difficulty: Difficulty::Easy,
            tags: vec!["math".to_string(), "arithmetic".to_string()],
            language: "English".to_string(),
            image_required: false,
        };
        assert_eq!(
            q.embedding_text(),
            "Question: What is 2+2? Solution: 4 Tags: math, arithmetic"
        );
    }

    #[test]
    fn test_embedding_text_matches_between_new_and_stored() {
        let new = NewQuestion {
            question: "Q".to_string(),
            question_type: QuestionType::Mcq,
            solution: "S".to_string(),
            difficulty: Difficulty::Hard,
            tags: vec!["t".to_string()],
            language: "English".to_string(),
            image_required: true,
        };
        let stored = Question {
            question_id: 7,
            question: new.question.clone(),
            question_type: new.question_type,
            solution: new.solution.clone(),
            difficulty: new.difficulty,
            tags: new.tags.clone(),
            language: new.language.clone(),
            image_required: new.image_required,
        };
        assert_eq!(new.embedding_text(), stored.embedding_text());
    }

    #[test]
    fn test_update_is_empty() {
        assert!(QuestionUpdate::default().is_empty());

        let update = QuestionUpdate {
            difficulty: Some(Difficulty::Medium),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
