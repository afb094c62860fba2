//! qbank application binary - composition root.
//!
//! Ties together all qbank crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Open storage (SQLite) and hydrate the similarity index from it
//! 3. Select the embedding generator (deterministic fallback by default,
//!    ONNX external model when configured and loadable)
//! 4. Start the axum REST API server

use std::path::PathBuf;
use std::sync::Arc;

use qbank_api::{routes, AppState};
use qbank_core::config::QbankConfig;
use qbank_export::Exporter;
use qbank_storage::{Database, EmbeddingRepository};
use qbank_vector::{
    DynEmbeddingGenerator, ExternalModelEmbedder, FallbackEmbedder, SimilarityIndex,
};

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Resolve the config file path (QBANK_CONFIG env, or ~/.qbank/config.toml).
fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("QBANK_CONFIG") {
        return PathBuf::from(p);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".qbank").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Pick the embedding generator from config. An unloadable external model
/// degrades to the deterministic fallback instead of aborting startup.
fn select_embedder(config: &QbankConfig) -> Arc<dyn DynEmbeddingGenerator> {
    if config.search.use_external_model {
        let model_dir = PathBuf::from(&config.search.model_dir);
        match ExternalModelEmbedder::from_directory(&model_dir) {
            Ok(embedder) => {
                tracing::info!(dir = %model_dir.display(), "External embedding model active");
                return Arc::new(embedder);
            }
            Err(e) => {
                tracing::warn!(
                    dir = %model_dir.display(),
                    error = %e,
                    "External embedding model unavailable, using fallback embedder"
                );
            }
        }
    }
    Arc::new(FallbackEmbedder::new())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting qbank v{}", env!("CARGO_PKG_VERSION"));

    // Config. QBANK_PORT overrides the configured port.
    let config_file = config_path();
    let mut config = QbankConfig::load_or_default(&config_file);
    if let Some(port) = std::env::var("QBANK_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
    {
        config.server.port = port;
    }
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("qbank.db");
    let database = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    // Similarity index, hydrated from the embeddings table.
    let index = Arc::new(SimilarityIndex::open(Arc::new(EmbeddingRepository::new(
        Arc::clone(&database),
    )))?);

    // Embedding generator.
    let embedder = select_embedder(&config);

    // Export directory.
    let exporter = Exporter::new(&config.export.output_dir)?;

    let port = config.server.port;
    let state = AppState::new(config, database, index, embedder, exporter);

    // === API server ===

    if let Err(e) = routes::start_server(state).await {
        tracing::error!(error = %e, "Failed to start — is another instance running?");
        tracing::error!("Try: QBANK_PORT={} cargo run -p qbank-app", port + 1);
        return Err(e.into());
    }

    Ok(())
}
