//! Error types for the extraction engine
//!
//! These are run-level failures. A caption that cannot be processed is not an
//! error here; it ends in an `ExtractionError` value inside the run report.

use thiserror::Error;

/// Errors that abort a run
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// Invalid configuration, reported before any model call
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caption set cannot be processed as given
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The history ledger could not record the run
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// A job was driven through an illegal state change
    #[error("Job state error: {0}")]
    JobState(#[from] ricettario_domain::InvalidTransition),

    /// Prompt template files could not be read
    #[error("Prompt template error: {0}")]
    Prompt(#[from] std::io::Error),
}
