use thiserror::Error;

/// Top-level error type for the qbank system.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates return
/// `QbankError` directly so that the `?` operator works seamlessly across
/// crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QbankError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// The similarity index (or its backing store) could not serve the
    /// operation. Distinct from `Storage` so callers can answer
    /// "service unavailable" instead of "operation failed".
    #[error("Similarity index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Question generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for QbankError {
    fn from(err: toml::de::Error) -> Self {
        QbankError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for QbankError {
    fn from(err: toml::ser::Error) -> Self {
        QbankError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for QbankError {
    fn from(err: serde_json::Error) -> Self {
        QbankError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for qbank operations.
pub type Result<T> = std::result::Result<T, QbankError>;
