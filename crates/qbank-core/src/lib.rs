pub mod config;
pub mod error;
pub mod types;

pub use config::QbankConfig;
pub use error::{QbankError, Result};
pub use types::*;
