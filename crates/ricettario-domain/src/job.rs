//! Job module - lifecycle of one bulk processing job
//!
//! A [`ProcessingJob`] tracks a set of captions through the batch state
//! machine and accumulates exactly one outcome per caption.

use crate::{CaptionId, ExecutionMode, ExtractionError};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a processing job (UUIDv7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u128);

impl JobId {
    /// Generate a new time-ordered job id
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().as_u128())
    }

    /// Get the raw u128 value
    pub fn value(&self) -> u128 {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_u128(self.0))
    }
}

/// State of a processing job
///
/// ```text
/// Created -> Submitted -> Polling -> Completed
///    \           \           \
///     +-----------+-----------+--> Failed -> FallbackConcurrent
/// ```
///
/// `Failed` is reachable from every non-terminal state because submission
/// itself can fail. `Completed` and `FallbackConcurrent` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Manifest assembled, nothing sent yet
    Created,
    /// Manifest accepted by the provider
    Submitted,
    /// Waiting for the provider to finish
    Polling,
    /// Results retrieved and reconciled
    Completed,
    /// Submission error, provider error status or poll timeout
    Failed,
    /// Unresolved captions handed to the concurrent executor
    FallbackConcurrent,
}

impl JobState {
    /// Get the state name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Submitted => "submitted",
            JobState::Polling => "polling",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::FallbackConcurrent => "fallback_concurrent",
        }
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Created, JobState::Submitted)
                | (JobState::Submitted, JobState::Polling)
                | (JobState::Polling, JobState::Completed)
                | (JobState::Created, JobState::Failed)
                | (JobState::Submitted, JobState::Failed)
                | (JobState::Polling, JobState::Failed)
                | (JobState::Failed, JobState::FallbackConcurrent)
        )
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::FallbackConcurrent)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    /// State the job was in
    pub from: JobState,
    /// State that was requested
    pub to: JobState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// A job covering an ordered set of captions
///
/// `T` is the stage result type: a classification for the first stage, an
/// extraction record for the second.
#[derive(Debug, Clone)]
pub struct ProcessingJob<T> {
    /// Local job identifier
    pub job_id: JobId,
    /// Execution strategy this job runs under
    pub mode: ExecutionMode,
    /// Current lifecycle state
    pub state: JobState,
    /// Submission time (seconds since epoch), set on entering `Submitted`
    pub submitted_at: Option<u64>,
    /// Captions in input order
    pub caption_ids: Vec<CaptionId>,
    /// One outcome per resolved caption
    pub partial_results: HashMap<CaptionId, Result<T, ExtractionError>>,
}

impl<T> ProcessingJob<T> {
    /// Create a job in the `Created` state
    pub fn new(mode: ExecutionMode, caption_ids: Vec<CaptionId>) -> Self {
        Self {
            job_id: JobId::new(),
            mode,
            state: JobState::Created,
            submitted_at: None,
            caption_ids,
            partial_results: HashMap::new(),
        }
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if next == JobState::Submitted {
            self.submitted_at = Some(now_secs());
        }
        self.state = next;
        Ok(())
    }

    /// Record an outcome unless the caption already has one
    ///
    /// Returns `false` when the caption is unknown to the job or was already
    /// resolved; the first outcome always wins.
    pub fn resolve(&mut self, caption_id: &CaptionId, outcome: Result<T, ExtractionError>) -> bool {
        if self.partial_results.contains_key(caption_id) || !self.caption_ids.contains(caption_id) {
            return false;
        }
        self.partial_results.insert(caption_id.clone(), outcome);
        true
    }

    /// Captions without an outcome, in input order
    pub fn unresolved(&self) -> Vec<CaptionId> {
        self.caption_ids
            .iter()
            .filter(|id| !self.partial_results.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Number of captions with an outcome
    pub fn resolved_count(&self) -> usize {
        self.partial_results.len()
    }

    /// Every caption has exactly one outcome
    pub fn is_complete(&self) -> bool {
        self.partial_results.len() == self.caption_ids.len()
            && self.caption_ids.iter().all(|id| self.partial_results.contains_key(id))
    }

    /// Consume the job, yielding outcomes in caption order
    ///
    /// Captions still unresolved map to `None`.
    pub fn into_ordered(mut self) -> Vec<(CaptionId, Option<Result<T, ExtractionError>>)> {
        self.caption_ids
            .into_iter()
            .map(|id| {
                let outcome = self.partial_results.remove(&id);
                (id, outcome)
            })
            .collect()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<CaptionId> {
        (0..n).map(|i| CaptionId::new(format!("c{}", i))).collect()
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job: ProcessingJob<u8> = ProcessingJob::new(ExecutionMode::Batch, ids(2));
        job.transition(JobState::Submitted).unwrap();
        assert!(job.submitted_at.is_some());
        job.transition(JobState::Polling).unwrap();
        job.transition(JobState::Completed).unwrap();
        assert!(job.state.is_terminal());
    }

    #[test]
    fn test_rejects_skipping_and_backwards() {
        let mut job: ProcessingJob<u8> = ProcessingJob::new(ExecutionMode::Batch, ids(1));
        assert!(job.transition(JobState::Completed).is_err());
        assert!(job.transition(JobState::FallbackConcurrent).is_err());

        job.transition(JobState::Submitted).unwrap();
        let err = job.transition(JobState::Created).unwrap_err();
        assert_eq!(err.from, JobState::Submitted);
        assert_eq!(err.to, JobState::Created);
    }

    #[test]
    fn test_completed_is_terminal() {
        for next in [
            JobState::Created,
            JobState::Submitted,
            JobState::Polling,
            JobState::Failed,
            JobState::FallbackConcurrent,
        ] {
            assert!(!JobState::Completed.can_transition_to(next));
            assert!(!JobState::FallbackConcurrent.can_transition_to(next));
        }
    }

    #[test]
    fn test_submission_failure_path() {
        let mut job: ProcessingJob<u8> = ProcessingJob::new(ExecutionMode::Batch, ids(1));
        job.transition(JobState::Failed).unwrap();
        job.transition(JobState::FallbackConcurrent).unwrap();
        assert!(job.state.is_terminal());
    }

    #[test]
    fn test_first_outcome_wins() {
        let caption_ids = ids(3);
        let mut job: ProcessingJob<u8> = ProcessingJob::new(ExecutionMode::Batch, caption_ids.clone());

        assert!(job.resolve(&caption_ids[1], Ok(1)));
        assert!(!job.resolve(&caption_ids[1], Ok(2)));
        assert!(!job.resolve(&CaptionId::from("stranger"), Ok(9)));

        assert_eq!(job.unresolved(), vec![caption_ids[0].clone(), caption_ids[2].clone()]);
        assert!(!job.is_complete());

        job.resolve(&caption_ids[0], Err(ExtractionError::missing("no line")));
        job.resolve(&caption_ids[2], Ok(3));
        assert!(job.is_complete());

        let ordered = job.into_ordered();
        assert_eq!(ordered[1].1.as_ref().unwrap().as_ref().unwrap(), &1);
        assert!(ordered[0].1.as_ref().unwrap().is_err());
    }
}
