//! Ricettario LLM Provider Layer
//!
//! The completion-service boundary of the extraction engine.
//!
//! # Architecture
//!
//! The engine sees a model through two async traits:
//!
//! - [`CompletionService`]: one prompt in, one JSON text out (concurrent mode)
//! - [`BatchService`]: a manifest of prompts submitted as one bulk job that is
//!   later polled and read back (batch mode)
//!
//! Both return [`LlmError`], whose [`LlmError::is_transient`] tells the caller
//! whether a retry may help.
//!
//! # Providers
//!
//! - `MockProvider`: Deterministic in-memory double for tests
//! - `OpenAiProvider`: OpenAI chat-completions, files and batches API
//!
//! # Examples
//!
//! ```
//! use ricettario_llm::{CompletionService, MockProvider, Prompt};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let provider = MockProvider::new(r#"{"is_recipe": true}"#);
//! let text = provider.complete(&Prompt::new("system", "caption")).await.unwrap();
//! assert_eq!(text, r#"{"is_recipe": true}"#);
//! # }
//! ```

#![warn(missing_docs)]

pub mod mock;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mock::{MockBatchOutcome, MockProvider};
pub use openai::OpenAiProvider;

/// Errors that can occur during LLM operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Provider-side failure (5xx)
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Body or reason text
        message: String,
    },

    /// Request did not finish in time
    #[error("Request timed out")]
    Timeout,

    /// Missing or rejected credentials
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Request rejected for any other reason
    #[error("LLM error: {0}")]
    Other(String),
}

impl LlmError {
    /// Whether retrying the same request may succeed
    ///
    /// Rate limits, timeouts, 5xx responses and connection failures are
    /// transient. Everything else fails the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Communication(_)
                | LlmError::RateLimitExceeded
                | LlmError::Server { .. }
                | LlmError::Timeout
        )
    }
}

/// A chat prompt: fixed instructions plus the caption-specific message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// System instructions
    pub system: String,
    /// User message
    pub user: String,
}

impl Prompt {
    /// Create a prompt
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Whether either part contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.system.contains(needle) || self.user.contains(needle)
    }
}

/// Synchronous single-request completion
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send one prompt and return the raw response text
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError>;

    /// Model identifier used for completions
    fn model_name(&self) -> &str;
}

/// One entry of a batch manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Caller-chosen id echoed back in the result line
    pub custom_id: String,
    /// Prompt to run
    pub prompt: Prompt,
}

/// Provider-side status of a bulk job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    /// Manifest is being validated
    Validating,
    /// Requests are being processed
    InProgress,
    /// Output is being assembled
    Finalizing,
    /// All requests processed
    Completed,
    /// Job failed as a whole
    Failed,
    /// Completion window elapsed
    Expired,
    /// Cancellation in progress
    Cancelling,
    /// Job was cancelled
    Cancelled,
}

impl BatchState {
    /// Parse a provider status string; unknown values read as in progress
    pub fn parse(s: &str) -> Self {
        match s {
            "validating" => BatchState::Validating,
            "in_progress" => BatchState::InProgress,
            "finalizing" => BatchState::Finalizing,
            "completed" => BatchState::Completed,
            "failed" => BatchState::Failed,
            "expired" => BatchState::Expired,
            "cancelling" => BatchState::Cancelling,
            "cancelled" => BatchState::Cancelled,
            _ => BatchState::InProgress,
        }
    }

    /// Get the status name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Validating => "validating",
            BatchState::InProgress => "in_progress",
            BatchState::Finalizing => "finalizing",
            BatchState::Completed => "completed",
            BatchState::Failed => "failed",
            BatchState::Expired => "expired",
            BatchState::Cancelling => "cancelling",
            BatchState::Cancelled => "cancelled",
        }
    }

    /// No further status change will happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Completed | BatchState::Failed | BatchState::Expired | BatchState::Cancelled
        )
    }
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by a status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatus {
    /// Provider status
    pub state: BatchState,
    /// Requests finished successfully so far
    pub completed: usize,
    /// Requests that failed so far
    pub failed: usize,
    /// Requests in the manifest
    pub total: usize,
    /// Whether some output can already be downloaded
    pub has_output: bool,
}

/// One line of batch output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResultLine {
    /// Id from the matching [`BatchRequest`]
    pub custom_id: String,
    /// Response text, or the provider's per-request error message
    pub outcome: Result<String, String>,
}

/// Asynchronous bulk-submission endpoint
#[async_trait]
pub trait BatchService: Send + Sync {
    /// Submit a manifest and return the provider job id
    async fn submit(&self, requests: &[BatchRequest]) -> Result<String, LlmError>;

    /// Query job status
    async fn status(&self, job_id: &str) -> Result<BatchStatus, LlmError>;

    /// Download whatever output lines the job has produced
    async fn results(&self, job_id: &str) -> Result<Vec<BatchResultLine>, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::RateLimitExceeded.is_transient());
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::Server { status: 503, message: "busy".into() }.is_transient());
        assert!(LlmError::Communication("reset".into()).is_transient());

        assert!(!LlmError::Auth("bad key".into()).is_transient());
        assert!(!LlmError::InvalidResponse("garbage".into()).is_transient());
        assert!(!LlmError::ModelNotAvailable("x".into()).is_transient());
        assert!(!LlmError::Other("400".into()).is_transient());
    }

    #[test]
    fn test_batch_state_parse() {
        assert_eq!(BatchState::parse("in_progress"), BatchState::InProgress);
        assert_eq!(BatchState::parse("expired"), BatchState::Expired);
        assert_eq!(BatchState::parse("something_new"), BatchState::InProgress);
        assert!(BatchState::Cancelled.is_terminal());
        assert!(!BatchState::Finalizing.is_terminal());
    }

    #[test]
    fn test_prompt_contains() {
        let prompt = Prompt::new("Classify", "Pasta al pomodoro");
        assert!(prompt.contains("pomodoro"));
        assert!(prompt.contains("Classify"));
        assert!(!prompt.contains("risotto"));
    }
}
