//! qbank export crate - renders question sets to CSV, JSON, and Markdown
//! files for download and offline use.

pub mod exporter;

pub use exporter::{ExportFormat, ExportStats, Exporter};
