//! Per-caption failure values
//!
//! A caption that cannot be processed ends in an [`ExtractionError`]. These are
//! ordinary values collected next to successful results, never run-level
//! errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a per-caption failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionErrorKind {
    /// The model answered but the answer could not be parsed or validated
    MalformedResponse,
    /// A batch job finished without producing a line for this caption
    MissingResult,
    /// Every retry attempt failed with a transient error
    RetriesExhausted,
    /// The provider refused the request with a non-transient error
    ProviderRejected,
    /// The run was aborted before this caption was resolved
    Cancelled,
}

impl ExtractionErrorKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionErrorKind::MalformedResponse => "malformed_response",
            ExtractionErrorKind::MissingResult => "missing_result",
            ExtractionErrorKind::RetriesExhausted => "retries_exhausted",
            ExtractionErrorKind::ProviderRejected => "provider_rejected",
            ExtractionErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure for one caption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionError {
    /// Failure category
    pub kind: ExtractionErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl ExtractionError {
    /// Create an error of the given kind
    pub fn new(kind: ExtractionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Unparseable or invalid model output
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::MalformedResponse, message)
    }

    /// No batch result line for the caption
    pub fn missing(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::MissingResult, message)
    }

    /// Transient failures outlasted the retry budget
    pub fn retries_exhausted(attempts: u32, last_error: impl fmt::Display) -> Self {
        Self::new(
            ExtractionErrorKind::RetriesExhausted,
            format!("gave up after {} attempts: {}", attempts, last_error),
        )
    }

    /// Non-transient provider refusal
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::ProviderRejected, message)
    }

    /// Left unresolved by cancellation
    pub fn cancelled() -> Self {
        Self::new(ExtractionErrorKind::Cancelled, "run cancelled before completion")
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ExtractionError {}
