//! Error types for iptv-hub
//!
//! Re-exports the error hierarchy defined in `types`.

pub mod types;

pub use types::{AppError, AppResult, ConnectionError, SourceError};
