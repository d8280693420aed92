//! Mock provider for deterministic testing
//!
//! [`MockProvider`] implements both [`CompletionService`] and [`BatchService`]
//! without any network calls. Responses are chosen by substring match on the
//! prompt, failures can be scripted per pattern, and the bulk endpoint follows
//! a configurable [`MockBatchOutcome`].

use crate::{
    BatchRequest, BatchResultLine, BatchService, BatchState, BatchStatus, CompletionService,
    LlmError, Prompt,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the mock bulk endpoint finishes a job
#[derive(Debug, Clone, PartialEq)]
pub enum MockBatchOutcome {
    /// Every request gets an output line
    Complete,
    /// Completes, but the listed custom ids have no output line
    CompleteWithout(Vec<String>),
    /// Job fails; only the first `resolved` requests have output
    Fail {
        /// Requests with output before the failure
        resolved: usize,
    },
    /// Completion window elapses; only the first `resolved` requests have output
    Expire {
        /// Requests with output before expiry
        resolved: usize,
    },
    /// Job never leaves `in_progress`
    Hang,
}

#[derive(Debug, Clone)]
struct ScriptedFailure {
    pattern: String,
    remaining: Option<usize>,
    error: LlmError,
}

#[derive(Debug)]
struct MockJob {
    requests: Vec<BatchRequest>,
    polls: usize,
}

#[derive(Debug)]
struct BatchScript {
    outcome: MockBatchOutcome,
    polls_until_done: usize,
    submit_error: Option<LlmError>,
    status_errors: usize,
    jobs: HashMap<String, MockJob>,
    submissions: usize,
    status_calls: usize,
}

impl Default for BatchScript {
    fn default() -> Self {
        Self {
            outcome: MockBatchOutcome::Complete,
            polls_until_done: 1,
            submit_error: None,
            status_errors: 0,
            jobs: HashMap::new(),
            submissions: 0,
            status_calls: 0,
        }
    }
}

/// Mock LLM provider for deterministic testing
///
/// Clones share all state, so a test can keep one handle for assertions while
/// the engine owns another.
///
/// # Examples
///
/// ```
/// use ricettario_llm::{CompletionService, LlmError, MockProvider, Prompt};
///
/// # #[tokio::main]
/// # async fn main() {
/// let provider = MockProvider::new("default");
/// provider.add_response("pomodoro", r#"{"is_recipe": true}"#);
/// provider.add_failures("flaky", 1, LlmError::RateLimitExceeded);
///
/// let hit = provider.complete(&Prompt::new("", "pasta al pomodoro")).await.unwrap();
/// assert_eq!(hit, r#"{"is_recipe": true}"#);
///
/// assert!(provider.complete(&Prompt::new("", "flaky")).await.is_err());
/// assert_eq!(provider.complete(&Prompt::new("", "flaky")).await.unwrap(), "default");
/// assert_eq!(provider.call_count(), 3);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    model: String,
    default_response: Arc<Mutex<String>>,
    responses: Arc<Mutex<Vec<(String, String)>>>,
    failures: Arc<Mutex<Vec<ScriptedFailure>>>,
    latency: Option<Duration>,
    latencies: Arc<Mutex<Vec<(String, Duration)>>>,
    call_count: Arc<Mutex<usize>>,
    in_flight: Arc<Mutex<(usize, usize)>>,
    batch: Arc<Mutex<BatchScript>>,
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            model: "mock-model".to_string(),
            default_response: Arc::new(Mutex::new(response.into())),
            responses: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(Vec::new())),
            latency: None,
            latencies: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            in_flight: Arc::new(Mutex::new((0, 0))),
            batch: Arc::new(Mutex::new(BatchScript::default())),
        }
    }

    /// Simulate a fixed latency on every completion call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay prompts containing `pattern` by `latency` instead of the fixed latency
    ///
    /// Patterns are checked in insertion order; the first match wins.
    pub fn add_latency(&self, pattern: impl Into<String>, latency: Duration) {
        self.latencies.lock().unwrap().push((pattern.into(), latency));
    }

    /// Report a different model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Replace the response used when no pattern matches
    pub fn set_default_response(&self, response: impl Into<String>) {
        *self.default_response.lock().unwrap() = response.into();
    }

    /// Respond with `response` to prompts containing `pattern`
    ///
    /// Patterns are checked in insertion order; the first match wins.
    pub fn add_response(&self, pattern: impl Into<String>, response: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push((pattern.into(), response.into()));
    }

    /// Fail the next `times` prompts containing `pattern` with `error`
    pub fn add_failures(&self, pattern: impl Into<String>, times: usize, error: LlmError) {
        self.failures.lock().unwrap().push(ScriptedFailure {
            pattern: pattern.into(),
            remaining: Some(times),
            error,
        });
    }

    /// Fail every prompt containing `pattern` with `error`
    pub fn add_error(&self, pattern: impl Into<String>, error: LlmError) {
        self.failures.lock().unwrap().push(ScriptedFailure {
            pattern: pattern.into(),
            remaining: None,
            error,
        });
    }

    /// Get the number of times complete was called
    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Reset the call count
    pub fn reset_call_count(&self) {
        *self.call_count.lock().unwrap() = 0;
    }

    /// Highest number of completion calls observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().1
    }

    /// Choose how submitted bulk jobs finish
    pub fn set_batch_outcome(&self, outcome: MockBatchOutcome) {
        self.batch.lock().unwrap().outcome = outcome;
    }

    /// Number of status queries a job answers `in_progress` before finishing
    pub fn set_polls_until_done(&self, polls: usize) {
        self.batch.lock().unwrap().polls_until_done = polls;
    }

    /// Make the next submission fail
    pub fn fail_batch_submission(&self, error: LlmError) {
        self.batch.lock().unwrap().submit_error = Some(error);
    }

    /// Make the next `times` status queries fail with a transient error
    pub fn fail_status_queries(&self, times: usize) {
        self.batch.lock().unwrap().status_errors = times;
    }

    /// Number of accepted bulk submissions
    pub fn batch_submissions(&self) -> usize {
        self.batch.lock().unwrap().submissions
    }

    /// Number of status queries received
    pub fn status_calls(&self) -> usize {
        self.batch.lock().unwrap().status_calls
    }

    fn respond(&self, prompt: &Prompt) -> Result<String, LlmError> {
        {
            let mut failures = self.failures.lock().unwrap();
            for failure in failures.iter_mut() {
                if !prompt.contains(&failure.pattern) {
                    continue;
                }
                match failure.remaining {
                    None => return Err(failure.error.clone()),
                    Some(0) => continue,
                    Some(ref mut n) => {
                        *n -= 1;
                        return Err(failure.error.clone());
                    }
                }
            }
        }

        let responses = self.responses.lock().unwrap();
        if let Some((_, response)) = responses.iter().find(|(p, _)| prompt.contains(p)) {
            return Ok(response.clone());
        }

        Ok(self.default_response.lock().unwrap().clone())
    }

    fn latency_for(&self, prompt: &Prompt) -> Option<Duration> {
        self.latencies
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| prompt.contains(p))
            .map(|(_, d)| *d)
            .or(self.latency)
    }

    fn output_lines(&self, requests: &[BatchRequest], outcome: &MockBatchOutcome) -> Vec<BatchResultLine> {
        let limit = match outcome {
            MockBatchOutcome::Fail { resolved } | MockBatchOutcome::Expire { resolved } => *resolved,
            MockBatchOutcome::Hang => 0,
            _ => requests.len(),
        };

        requests
            .iter()
            .take(limit)
            .filter(|r| match outcome {
                MockBatchOutcome::CompleteWithout(missing) => !missing.contains(&r.custom_id),
                _ => true,
            })
            .map(|r| BatchResultLine {
                custom_id: r.custom_id.clone(),
                outcome: self.respond(&r.prompt).map_err(|e| e.to_string()),
            })
            .collect()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("Default mock response")
    }
}

#[async_trait]
impl CompletionService for MockProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        *self.call_count.lock().unwrap() += 1;
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            in_flight.0 += 1;
            in_flight.1 = in_flight.1.max(in_flight.0);
        }

        if let Some(latency) = self.latency_for(prompt) {
            tokio::time::sleep(latency).await;
        }
        let result = self.respond(prompt);

        self.in_flight.lock().unwrap().0 -= 1;
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl BatchService for MockProvider {
    async fn submit(&self, requests: &[BatchRequest]) -> Result<String, LlmError> {
        let mut batch = self.batch.lock().unwrap();
        if let Some(error) = batch.submit_error.take() {
            return Err(error);
        }

        batch.submissions += 1;
        let job_id = format!("batch_mock_{}", batch.submissions);
        batch.jobs.insert(
            job_id.clone(),
            MockJob {
                requests: requests.to_vec(),
                polls: 0,
            },
        );
        Ok(job_id)
    }

    async fn status(&self, job_id: &str) -> Result<BatchStatus, LlmError> {
        let mut batch = self.batch.lock().unwrap();
        batch.status_calls += 1;
        if batch.status_errors > 0 {
            batch.status_errors -= 1;
            return Err(LlmError::Communication("mock status failure".to_string()));
        }

        let polls_until_done = batch.polls_until_done;
        let outcome = batch.outcome.clone();
        let job = batch
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| LlmError::Other(format!("unknown batch {}", job_id)))?;
        job.polls += 1;
        let total = job.requests.len();

        let in_progress = BatchStatus {
            state: BatchState::InProgress,
            completed: 0,
            failed: 0,
            total,
            has_output: false,
        };
        if job.polls < polls_until_done {
            return Ok(in_progress);
        }

        let status = match outcome {
            MockBatchOutcome::Hang => in_progress,
            MockBatchOutcome::Complete => BatchStatus {
                state: BatchState::Completed,
                completed: total,
                failed: 0,
                total,
                has_output: true,
            },
            MockBatchOutcome::CompleteWithout(ref missing) => BatchStatus {
                state: BatchState::Completed,
                completed: total.saturating_sub(missing.len()),
                failed: 0,
                total,
                has_output: true,
            },
            MockBatchOutcome::Fail { resolved } => BatchStatus {
                state: BatchState::Failed,
                completed: resolved.min(total),
                failed: 0,
                total,
                has_output: resolved > 0,
            },
            MockBatchOutcome::Expire { resolved } => BatchStatus {
                state: BatchState::Expired,
                completed: resolved.min(total),
                failed: 0,
                total,
                has_output: resolved > 0,
            },
        };
        Ok(status)
    }

    async fn results(&self, job_id: &str) -> Result<Vec<BatchResultLine>, LlmError> {
        let (requests, outcome) = {
            let batch = self.batch.lock().unwrap();
            let job = batch
                .jobs
                .get(job_id)
                .ok_or_else(|| LlmError::Other(format!("unknown batch {}", job_id)))?;
            (job.requests.clone(), batch.outcome.clone())
        };
        Ok(self.output_lines(&requests, &outcome))
    }
}
