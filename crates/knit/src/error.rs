//! Error types for knit.

use thiserror::Error;

/// Main error type for knit operations.
#[derive(Error, Debug)]
pub enum KnitError {
    #[error("Invalid point description {path}: {message}")]
    PointDescription { path: String, message: String },

    #[error("Compiler not available: {0}")]
    CompilerNotAvailable(String),

    #[error(transparent)]
    Core(#[from] knit_core::Error),
}
