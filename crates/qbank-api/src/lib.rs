//! qbank API crate - axum HTTP layer over the question bank.
//!
//! Provides the router, handlers for question CRUD / filtering / search /
//! redundancy detection / export, a JSON error envelope, and the shared
//! application state.

pub mod error;
pub mod generate;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use generate::QuestionGenerator;
pub use routes::{create_router, start_server};
pub use state::AppState;
