//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, and compression, plus all
//! endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
///
/// CORS is permissive: the backend serves browser frontends from arbitrary
/// origins, as the deployment has no same-origin guarantee.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/questions",
            get(handlers::list_questions).post(handlers::create_question),
        )
        .route("/questions/filter", get(handlers::filter_questions))
        .route(
            "/questions/{id}",
            get(handlers::get_question)
                .put(handlers::update_question)
                .delete(handlers::delete_question),
        )
        .route("/filter-options", get(handlers::filter_options))
        .route("/stats", get(handlers::stats))
        .route("/search", post(handlers::search))
        .route("/redundant", post(handlers::find_redundant))
        .route("/export", post(handlers::export_questions))
        .route("/generate", post(handlers::generate_questions))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB global limit
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
///
/// Binds to 127.0.0.1 (localhost only) on the port from config.
pub async fn start_server(state: AppState) -> Result<(), qbank_core::error::QbankError> {
    let port = state.config.lock().map(|c| c.server.port).unwrap_or(8000);
    let addr = format!("127.0.0.1:{}", port);

    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| qbank_core::error::QbankError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| qbank_core::error::QbankError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
