//! Question-set export to CSV, JSON, and Markdown.
//!
//! Files are written under a configured output directory with timestamped
//! default filenames. CSV is the spreadsheet interchange format, JSON is the
//! machine-readable dump, and Markdown is the print-oriented document.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use qbank_core::error::{QbankError, Result};
use qbank_core::types::Question;

/// Supported export formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Markdown,
}

impl ExportFormat {
    /// All formats, in the order `generate_all` emits them.
    pub fn all() -> [ExportFormat; 3] {
        [ExportFormat::Csv, ExportFormat::Json, ExportFormat::Markdown]
    }

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
        }
    }

    /// MIME type for HTTP responses.
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
            ExportFormat::Markdown => "text/markdown",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportFormat {
    type Err = QbankError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(QbankError::Export(format!(
                "Invalid format '{}'. Use 'csv', 'json', 'markdown', or 'all'",
                other
            ))),
        }
    }
}

/// Summary statistics for an exported question set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportStats {
    pub total_questions: usize,
    pub difficulty_distribution: BTreeMap<String, usize>,
    pub type_distribution: BTreeMap<String, usize>,
    pub language_distribution: BTreeMap<String, usize>,
    pub questions_with_images: usize,
    pub unique_tags: Vec<String>,
}

/// Writes question sets to files under an output directory.
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    /// Create an exporter, creating the output directory if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// The directory exports are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render `questions` in the given format.
    ///
    /// With no filename a timestamped one is generated; a caller-supplied
    /// name gets the format's extension appended unless already present.
    pub fn generate(
        &self,
        questions: &[Question],
        format: ExportFormat,
        filename: Option<&str>,
    ) -> Result<PathBuf> {
        let name = match filename {
            Some(name) => ensure_extension(name, format.extension()),
            None => format!("{}.{}", default_basename(), format.extension()),
        };
        let path = self.output_dir.join(name);

        let content = match format {
            ExportFormat::Csv => render_csv(questions),
            ExportFormat::Json => serde_json::to_string_pretty(questions)?,
            ExportFormat::Markdown => render_markdown(questions),
        };
        std::fs::write(&path, content)
            .map_err(|e| QbankError::Export(format!("Failed to write {}: {}", path.display(), e)))?;

        info!(path = %path.display(), count = questions.len(), "Questions exported");
        Ok(path)
    }

    /// Render `questions` in every format, sharing one base filename.
    pub fn generate_all(
        &self,
        questions: &[Question],
        base_filename: Option<&str>,
    ) -> Result<Vec<(ExportFormat, PathBuf)>> {
        let base = base_filename
            .map(str::to_string)
            .unwrap_or_else(default_basename);

        let mut results = Vec::new();
        for format in ExportFormat::all() {
            let name = format!("{}.{}", base, format.extension());
            let path = self.generate(questions, format, Some(&name))?;
            results.push((format, path));
        }
        Ok(results)
    }

    /// Summary statistics for the given question set.
    pub fn file_stats(&self, questions: &[Question]) -> ExportStats {
        let mut stats = ExportStats {
            total_questions: questions.len(),
            ..Default::default()
        };
        let mut tags = BTreeSet::new();

        for question in questions {
            *stats
                .difficulty_distribution
                .entry(question.difficulty.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .type_distribution
                .entry(question.question_type.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .language_distribution
                .entry(question.language.clone())
                .or_insert(0) += 1;
            if question.image_required {
                stats.questions_with_images += 1;
            }
            for tag in &question.tags {
                tags.insert(tag.clone());
            }
        }

        stats.unique_tags = tags.into_iter().collect();
        stats
    }
}

fn default_basename() -> String {
    format!(
        "questions_export_{}",
        Local::now().format("%Y%m%d_%H%M%S")
    )
}

fn ensure_extension(name: &str, extension: &str) -> String {
    if name.ends_with(&format!(".{}", extension)) {
        name.to_string()
    } else {
        format!("{}.{}", name, extension)
    }
}

const CSV_HEADER: &str = "ID,Question,Type,Difficulty,Language,Solution,Tags,Image Required";

fn render_csv(questions: &[Question]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for question in questions {
        let fields = [
            question.question_id.to_string(),
            question.question.clone(),
            question.question_type.as_str().to_string(),
            question.difficulty.as_str().to_string(),
            question.language.clone(),
            question.solution.clone(),
            question.tags.join(", "),
            if question.image_required { "Yes" } else { "No" }.to_string(),
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_escape(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn render_markdown(questions: &[Question]) -> String {
    let mut out = String::from("# Question Bank Export\n\n");
    out.push_str(&format!(
        "Export Date: {}\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!("Total Questions: {}\n\n", questions.len()));

    for (i, question) in questions.iter().enumerate() {
        out.push_str(&format!(
            "## {}. {} (ID {})\n\n",
            i + 1,
            question.question,
            question.question_id
        ));
        out.push_str(&format!(
            "- **Type**: {}\n- **Difficulty**: {}\n- **Language**: {}\n",
            question.question_type, question.difficulty, question.language
        ));
        if !question.tags.is_empty() {
            out.push_str(&format!("- **Tags**: {}\n", question.tags.join(", ")));
        }
        if question.image_required {
            out.push_str("- **Image Required**: Yes\n");
        }
        out.push_str(&format!("\n**Solution**: {}\n\n", question.solution));
    }
    out
}
