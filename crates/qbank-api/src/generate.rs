//! Question-generation capability boundary.
//!
//! Generation is an external collaborator (an LLM behind an API). This
//! module only defines the seam: `AppState` holds an
//! `Option<Arc<dyn QuestionGenerator>>`, and the `/generate` endpoint
//! answers 503 service-unavailable when none is configured. No live model
//! client ships with this crate.

use std::future::Future;
use std::pin::Pin;

use qbank_core::error::QbankError;
use qbank_core::types::NewQuestion;

/// Generates draft questions from source material text.
pub trait QuestionGenerator: Send + Sync {
    /// Produce draft questions for the given source text (boxed future so
    /// the trait stays object-safe).
    fn generate<'a>(
        &'a self,
        source_text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<NewQuestion>, QbankError>> + Send + 'a>>;
}
