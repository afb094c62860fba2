//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path/query/body parameters via axum extractors,
//! interacts with AppState services, and returns JSON responses. The
//! similarity index is a reactive consumer of question lifecycle: create
//! and update recompute the embedding and upsert it, delete removes it. An
//! unavailable index never fails the relational operation; the response
//! reports it instead.

use std::collections::{BTreeMap, HashSet};

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use qbank_core::types::{NewQuestion, Question, QuestionStats, QuestionUpdate};
use qbank_export::{ExportFormat, ExportStats};
use qbank_storage::{queries, FilterField, QuestionFilter};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Query parameter types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FilterParams {
    /// Comma-separated tag list; a question matches if it carries ANY of them.
    pub tags: Option<String>,
    pub difficulty: Option<String>,
    pub language: Option<String>,
    pub question_type: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

// =============================================================================
// Request body types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RedundantRequest {
    /// Distance threshold; pairs closer than this are flagged. Falls back to
    /// the configured default.
    pub threshold: Option<f64>,
    /// Neighbors fetched per record (must be >= 2 to see anything beyond
    /// self). Falls back to the configured default.
    pub n: Option<usize>,
}

fn default_export_format() -> String {
    "csv".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    /// Empty means "export everything".
    #[serde(default)]
    pub question_ids: Vec<i64>,
    /// "csv", "json", "markdown", or "all".
    #[serde(default = "default_export_format")]
    pub format: String,
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Source material to derive questions from.
    pub text: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub total_questions: u64,
    pub index_size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateQuestionResponse {
    pub question_id: i64,
    /// False when the similarity index could not store the embedding; the
    /// question row itself was created either way.
    pub indexed: bool,
    pub question: Question,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateQuestionResponse {
    pub message: String,
    pub indexed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub total_questions: u64,
    pub questions: Vec<Question>,
    pub limit: Option<u64>,
    pub offset: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilterEcho {
    pub tags: Option<Vec<String>>,
    pub difficulty: Option<String>,
    pub language: Option<String>,
    pub question_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilterResponse {
    pub total_results: u64,
    pub questions: Vec<Question>,
    pub filters: FilterEcho,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilterOptionsResponse {
    pub difficulties: Vec<String>,
    pub languages: Vec<String>,
    pub question_types: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub success: bool,
    pub statistics: QuestionStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResultEntry {
    #[serde(flatten)]
    pub question: Question,
    /// "sql" for keyword matches, "vector" for semantic neighbors.
    pub search_source: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub total_results: u64,
    pub results: Vec<SearchResultEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedundantResponse {
    pub redundant_question_ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportAllResponse {
    pub success: bool,
    pub message: String,
    /// Format name -> generated file path.
    pub files: BTreeMap<String, String>,
    pub stats: ExportStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub questions: Vec<NewQuestion>,
}

// =============================================================================
// Handler functions
// =============================================================================

/// GET / - service banner.
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "qbank question bank API is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /health - liveness plus basic corpus counters.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let uptime = state.start_time.elapsed().as_secs();
    let total_questions = state.questions.count().unwrap_or(0);
    let index_size = state.index.len() as u64;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
        total_questions,
        index_size,
    }))
}

/// POST /questions - create a question and index its embedding.
pub async fn create_question(
    State(state): State<AppState>,
    Json(payload): Json<NewQuestion>,
) -> Result<Json<CreateQuestionResponse>, ApiError> {
    if payload.question.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Question text must not be empty".to_string(),
        ));
    }

    let question_id = state.questions.insert(&payload)?;

    let text = payload.embedding_text();
    let vector = state.embedder.embed_boxed(&text).await;
    let indexed = match state
        .index
        .upsert(&question_id.to_string(), vector, &text)
    {
        Ok(()) => true,
        Err(e) => {
            warn!(question_id, error = %e, "Question stored but not indexed");
            false
        }
    };

    Ok(Json(CreateQuestionResponse {
        question_id,
        indexed,
        question: payload.with_id(question_id),
    }))
}

/// GET /questions/{id} - fetch one question.
pub async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Question>, ApiError> {
    match state.questions.find_by_id(id)? {
        Some(question) => Ok(Json(question)),
        None => Err(ApiError::NotFound(format!(
            "Question with id {} not found",
            id
        ))),
    }
}

/// PUT /questions/{id} - partial update, then re-embed.
pub async fn update_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<QuestionUpdate>,
) -> Result<Json<UpdateQuestionResponse>, ApiError> {
    if update.is_empty() {
        return Err(ApiError::BadRequest(
            "No valid fields provided for update".to_string(),
        ));
    }

    if !state.questions.update(id, &update)? {
        return Err(ApiError::NotFound(format!(
            "Question with id {} not found",
            id
        )));
    }

    // Recompute the embedding from the full updated row so the index stays
    // in step with the relational store.
    let indexed = match state.questions.find_by_id(id)? {
        Some(question) => {
            let text = question.embedding_text();
            let vector = state.embedder.embed_boxed(&text).await;
            match state.index.upsert(&id.to_string(), vector, &text) {
                Ok(()) => true,
                Err(e) => {
                    warn!(question_id = id, error = %e, "Question updated but not re-indexed");
                    false
                }
            }
        }
        None => false,
    };

    Ok(Json(UpdateQuestionResponse {
        message: format!("Question with id {} updated successfully", id),
        indexed,
    }))
}

/// DELETE /questions/{id} - remove the row and its index entry. Idempotent.
pub async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.questions.delete(id)?;

    if let Err(e) = state.index.delete(&id.to_string()) {
        warn!(question_id = id, error = %e, "Question deleted but index entry remains");
    }

    Ok(Json(MessageResponse {
        message: format!("Question with id {} deleted successfully", id),
    }))
}

/// GET /questions - list with pagination.
pub async fn list_questions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let offset = params.offset.unwrap_or(0);
    let questions = state.questions.list(params.limit, offset)?;

    Ok(Json(ListResponse {
        total_questions: questions.len() as u64,
        questions,
        limit: params.limit,
        offset,
    }))
}

/// GET /questions/filter - filter by tags/difficulty/language/type.
pub async fn filter_questions(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> Result<Json<FilterResponse>, ApiError> {
    let tag_list: Option<Vec<String>> = params.tags.as_deref().map(|tags| {
        tags.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    });

    let filter = QuestionFilter {
        tags: tag_list.clone(),
        difficulty: params.difficulty.clone(),
        language: params.language.clone(),
        question_type: params.question_type.clone(),
        limit: params.limit,
        offset: params.offset.unwrap_or(0),
    };
    let questions = state.questions.filter(&filter)?;

    Ok(Json(FilterResponse {
        total_results: questions.len() as u64,
        questions,
        filters: FilterEcho {
            tags: tag_list,
            difficulty: params.difficulty,
            language: params.language,
            question_type: params.question_type,
        },
    }))
}

/// GET /filter-options - distinct values for every filterable field.
pub async fn filter_options(
    State(state): State<AppState>,
) -> Result<Json<FilterOptionsResponse>, ApiError> {
    let difficulties = queries::get_unique_values(&state.database, FilterField::Difficulty)?;
    let languages = queries::get_unique_values(&state.database, FilterField::Language)?;
    let question_types = queries::get_unique_values(&state.database, FilterField::QuestionType)?;
    let tags = queries::get_all_tags(&state.database)?;

    Ok(Json(FilterOptionsResponse {
        difficulties,
        languages,
        question_types,
        tags,
    }))
}

/// GET /stats - aggregate question-bank statistics.
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let statistics = queries::get_stats(&state.database)?;
    Ok(Json(StatsResponse {
        success: true,
        statistics,
    }))
}

/// POST /search - keyword matches first, then semantic neighbors, deduplicated.
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::BadRequest(
            "Parameter 'query' must not be empty".to_string(),
        ));
    }

    let (default_limit, max_limit) = state
        .config
        .lock()
        .map(|c| (c.search.default_limit as u64, c.search.max_limit as u64))
        .unwrap_or((10, 100));
    let limit = request.limit.unwrap_or(default_limit).clamp(1, max_limit) as usize;

    let mut seen: HashSet<i64> = HashSet::new();
    let mut results: Vec<SearchResultEntry> = Vec::new();

    match state.questions.search(&query, limit as u64) {
        Ok(matches) => {
            for question in matches {
                seen.insert(question.question_id);
                results.push(SearchResultEntry {
                    question,
                    search_source: "sql".to_string(),
                });
            }
        }
        Err(e) => warn!(error = %e, "Keyword search failed"),
    }

    // Semantic pass: nearest neighbors of the embedded query, filled in
    // behind the keyword matches. An unavailable index degrades to
    // keyword-only results rather than failing the request.
    match state.search.search(&query, limit).await {
        Ok(neighbors) => {
            for neighbor in neighbors {
                let Ok(id) = neighbor.id.parse::<i64>() else {
                    warn!(id = %neighbor.id, "Non-numeric id in similarity index");
                    continue;
                };
                if seen.contains(&id) {
                    continue;
                }
                if let Some(question) = state.questions.find_by_id(id)? {
                    seen.insert(id);
                    results.push(SearchResultEntry {
                        question,
                        search_source: "vector".to_string(),
                    });
                }
            }
        }
        Err(e) => warn!(error = %e, "Semantic search unavailable, keyword results only"),
    }

    results.truncate(limit);

    Ok(Json(SearchResponse {
        query,
        total_results: results.len() as u64,
        results,
    }))
}

/// POST /redundant - scan the index for near-duplicate questions.
///
/// Returns the flagged ids for the caller to review; nothing is deleted.
pub async fn find_redundant(
    State(state): State<AppState>,
    Json(request): Json<RedundantRequest>,
) -> Result<Json<RedundantResponse>, ApiError> {
    let (default_threshold, default_neighbors) = state
        .config
        .lock()
        .map(|c| {
            (
                c.search.redundancy_threshold,
                c.search.redundancy_neighbors,
            )
        })
        .unwrap_or((0.8, 2));
    let threshold = request.threshold.unwrap_or(default_threshold);
    let k = request.n.unwrap_or(default_neighbors);

    let flagged = state.detector.find_redundant(threshold, k)?;

    let mut redundant_question_ids: Vec<i64> = flagged
        .iter()
        .filter_map(|id| match id.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(id = %id, "Non-numeric id in similarity index");
                None
            }
        })
        .collect();
    redundant_question_ids.sort_unstable();

    Ok(Json(RedundantResponse {
        redundant_question_ids,
    }))
}

/// POST /export - render questions to a file and return it, or generate
/// every format and return their paths.
pub async fn export_questions(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let questions = if request.question_ids.is_empty() {
        state.questions.list(None, 0)?
    } else {
        state.questions.find_by_ids(&request.question_ids)?
    };
    if questions.is_empty() {
        return Err(ApiError::NotFound("No questions found".to_string()));
    }

    if request.format == "all" {
        let generated = state
            .exporter
            .generate_all(&questions, request.filename.as_deref())?;
        let files: BTreeMap<String, String> = generated
            .into_iter()
            .map(|(format, path)| (format.to_string(), path.display().to_string()))
            .collect();
        let stats = state.exporter.file_stats(&questions);

        return Ok(Json(ExportAllResponse {
            success: true,
            message: format!("Generated {} questions in all formats", questions.len()),
            files,
            stats,
        })
        .into_response());
    }

    let format: ExportFormat = request.format.parse()?;
    let path = state
        .exporter
        .generate(&questions, format, request.filename.as_deref())?;

    let bytes = std::fs::read(&path)
        .map_err(|e| ApiError::Internal(format!("Failed to read export file: {}", e)))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("export.{}", format.extension()));

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// POST /generate - draft questions from source text via the optional
/// generation service; 503 when none is configured.
pub async fn generate_questions(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let generator = state.generator.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable(
            "Question generation service not available".to_string(),
        )
    })?;

    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "No source text provided".to_string(),
        ));
    }

    let questions = generator.generate(&request.text).await?;
    Ok(Json(GenerateResponse { questions }))
}
