use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{QbankError, Result};

/// Top-level configuration for the qbank backend.
///
/// Loaded from `~/.qbank/config.toml` by default. Each section corresponds
/// to a subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QbankConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl QbankConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: QbankConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| QbankError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database and the similarity index.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.qbank/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind on 127.0.0.1.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

/// Similarity search and redundancy detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Embedding dimension. All vectors in one index share this length.
    pub embedding_dim: usize,
    /// Default number of results for search endpoints.
    pub default_limit: usize,
    /// Maximum number of results for search endpoints.
    pub max_limit: usize,
    /// Default distance threshold for the redundancy scan.
    pub redundancy_threshold: f64,
    /// Default neighbor count (n_results) for the redundancy scan.
    pub redundancy_neighbors: usize,
    /// Use the external ONNX embedding model when available. The
    /// deterministic fallback embedder is used otherwise, and whenever the
    /// external model fails.
    pub use_external_model: bool,
    /// Directory holding `model.onnx` and `tokenizer.json` for the external
    /// embedding model.
    pub model_dir: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 384,
            default_limit: 10,
            max_limit: 100,
            redundancy_threshold: 0.8,
            redundancy_neighbors: 2,
            use_external_model: false,
            model_dir: String::new(),
        }
    }
}

/// Export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory where exported files are written.
    pub output_dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: "./exports".to_string(),
        }
    }
}
