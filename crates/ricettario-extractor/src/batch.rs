//! Batch job management
//!
//! One stage over a set of captions becomes one provider bulk job:
//!
//! 1. build a manifest with one request per caption (`req-<index>`)
//! 2. submit it, or resume the unfinished provider job the journal remembers
//!    for the same manifest
//! 3. poll with doubling, capped waits until the job reaches a final state
//! 4. reconcile output lines back to captions
//! 5. on failure, keep any partial output and hand exactly the unresolved
//!    captions to the concurrent executor
//!
//! Every caption ends with exactly one outcome.

use crate::clock::Sleeper;
use crate::config::PollingConfig;
use crate::error::ExtractorError;
use crate::executor::ConcurrentExecutor;
use crate::pipeline::Stage;
use crate::progress::ProgressSink;
use ricettario_domain::{
    CaptionId, CaptionUnit, ExecutionMode, ExtractionError, JobJournal, JobState, JournalEntry,
    ProcessingJob,
};
use ricettario_llm::{BatchRequest, BatchResultLine, BatchService, BatchState, BatchStatus};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Build the manifest for one stage over `captions`
pub fn build_manifest<S: Stage>(stage: &S, captions: &[CaptionUnit]) -> Vec<BatchRequest> {
    captions
        .iter()
        .enumerate()
        .map(|(index, caption)| BatchRequest {
            custom_id: request_id(index),
            prompt: stage.prompt(caption),
        })
        .collect()
}

/// Stable fingerprint of a manifest
pub fn manifest_fingerprint(requests: &[BatchRequest]) -> String {
    let mut hasher = Sha256::new();
    for request in requests {
        hasher.update(request.custom_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(request.prompt.system.as_bytes());
        hasher.update([0u8]);
        hasher.update(request.prompt.user.as_bytes());
        hasher.update([0xffu8]);
    }
    format!("{:x}", hasher.finalize())
}

fn request_id(index: usize) -> String {
    format!("req-{}", index)
}

fn request_index(custom_id: &str) -> Option<usize> {
    custom_id.strip_prefix("req-")?.parse().ok()
}

/// Result of driving one batch job to a terminal state
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// The job, in `Completed` or `FallbackConcurrent`
    pub job: ProcessingJob<T>,
    /// Captions resolved from provider output
    pub batch_resolved: usize,
    /// Captions re-dispatched to the concurrent executor
    pub fallback_count: usize,
}

impl<T> BatchOutcome<T> {
    /// Outcomes in caption order
    pub fn into_results(self) -> Vec<Result<T, ExtractionError>> {
        self.job
            .into_ordered()
            .into_iter()
            .map(|(id, outcome)| {
                outcome.unwrap_or_else(|| {
                    Err(ExtractionError::missing(format!("no outcome for caption {}", id)))
                })
            })
            .collect()
    }
}

enum PollEnd {
    Finished(BatchStatus),
    Failed(String),
    Cancelled,
}

/// Drives provider bulk jobs through their lifecycle
pub struct BatchJobManager<J> {
    batch: Arc<dyn BatchService>,
    journal: Arc<J>,
    polling: PollingConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl<J> BatchJobManager<J>
where
    J: JobJournal + Send + Sync,
    J::Error: Display,
{
    /// Create a manager
    pub fn new(
        batch: Arc<dyn BatchService>,
        journal: Arc<J>,
        polling: PollingConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            batch,
            journal,
            polling,
            sleeper,
        }
    }

    /// Run `stage` over `captions` as one bulk job
    ///
    /// Failures of the bulk job are not errors: they end in fallback through
    /// `executor`. Only an illegal state change aborts.
    pub async fn run<S: Stage>(
        &self,
        stage: &S,
        captions: &[CaptionUnit],
        executor: &ConcurrentExecutor,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome<S::Output>, ExtractorError> {
        let ids: Vec<CaptionId> = captions.iter().map(|c| c.id.clone()).collect();
        let mut job = ProcessingJob::new(ExecutionMode::Batch, ids);

        if captions.is_empty() {
            job.transition(JobState::Submitted)?;
            job.transition(JobState::Polling)?;
            job.transition(JobState::Completed)?;
            return Ok(BatchOutcome {
                job,
                batch_resolved: 0,
                fallback_count: 0,
            });
        }

        let requests = build_manifest(stage, captions);
        let fingerprint = manifest_fingerprint(&requests);
        info!(
            "Starting batch {} for {} captions (job {})",
            stage.name(),
            captions.len(),
            job.job_id
        );

        let provider_job_id = match self.submit_or_resume(&mut job, &requests, &fingerprint, cancel).await? {
            Some(id) => id,
            None => return self.fall_back(stage, captions, job, 0, executor, progress, cancel).await,
        };

        job.transition(JobState::Polling)?;
        let label = format!("batch {}", stage.name());
        match self.poll(&provider_job_id, &label, progress, cancel).await {
            PollEnd::Finished(status) if status.state == BatchState::Completed => {
                let lines = match self.batch.results(&provider_job_id).await {
                    Ok(lines) => lines,
                    Err(e) => {
                        warn!("Failed to download results of batch {}: {}", provider_job_id, e);
                        job.transition(JobState::Failed)?;
                        self.finish(&fingerprint, "failed");
                        return self.fall_back(stage, captions, job, 0, executor, progress, cancel).await;
                    }
                };
                let batch_resolved = reconcile(stage, captions, &mut job, lines);
                for id in job.unresolved() {
                    job.resolve(&id, Err(ExtractionError::missing("no output line for request")));
                }
                job.transition(JobState::Completed)?;
                self.finish(&fingerprint, BatchState::Completed.as_str());
                info!(
                    "Batch {} completed: {} of {} captions resolved",
                    provider_job_id,
                    batch_resolved,
                    captions.len()
                );
                Ok(BatchOutcome {
                    job,
                    batch_resolved,
                    fallback_count: 0,
                })
            }
            PollEnd::Finished(status) => {
                warn!(
                    "Batch {} ended as {} with {} of {} requests done",
                    provider_job_id, status.state, status.completed, status.total
                );
                let mut batch_resolved = 0;
                if status.has_output {
                    match self.batch.results(&provider_job_id).await {
                        Ok(lines) => batch_resolved = reconcile(stage, captions, &mut job, lines),
                        Err(e) => warn!("Failed to download partial results: {}", e),
                    }
                }
                job.transition(JobState::Failed)?;
                self.finish(&fingerprint, status.state.as_str());
                self.fall_back(stage, captions, job, batch_resolved, executor, progress, cancel)
                    .await
            }
            PollEnd::Failed(reason) => {
                warn!("Batch {} failed: {}", provider_job_id, reason);
                job.transition(JobState::Failed)?;
                self.finish(&fingerprint, "failed");
                self.fall_back(stage, captions, job, 0, executor, progress, cancel).await
            }
            PollEnd::Cancelled => {
                info!(
                    "Stopped polling batch {}; the provider job keeps running and the next run resumes it",
                    provider_job_id
                );
                job.transition(JobState::Failed)?;
                self.fall_back(stage, captions, job, 0, executor, progress, cancel).await
            }
        }
    }

    /// Returns the provider job id, or `None` when submission failed
    async fn submit_or_resume<T>(
        &self,
        job: &mut ProcessingJob<T>,
        requests: &[BatchRequest],
        fingerprint: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ExtractorError> {
        match self.journal.find_unfinished(fingerprint) {
            Ok(Some(entry)) => {
                info!(
                    "Resuming batch {} submitted at {}",
                    entry.provider_job_id, entry.submitted_at
                );
                job.transition(JobState::Submitted)?;
                return Ok(Some(entry.provider_job_id));
            }
            Ok(None) => {}
            Err(e) => warn!("Job journal lookup failed, submitting fresh: {}", e),
        }

        if cancel.is_cancelled() {
            job.transition(JobState::Failed)?;
            return Ok(None);
        }

        match self.batch.submit(requests).await {
            Ok(provider_job_id) => {
                job.transition(JobState::Submitted)?;
                let entry = JournalEntry {
                    manifest_fingerprint: fingerprint.to_string(),
                    provider_job_id: provider_job_id.clone(),
                    request_count: requests.len(),
                    submitted_at: job.submitted_at.unwrap_or_else(now_secs),
                };
                if let Err(e) = self.journal.record_submission(&entry) {
                    warn!("Failed to journal batch {}: {}", provider_job_id, e);
                }
                info!("Submitted batch {} with {} requests", provider_job_id, requests.len());
                Ok(Some(provider_job_id))
            }
            Err(e) => {
                warn!("Batch submission failed: {}", e);
                job.transition(JobState::Failed)?;
                Ok(None)
            }
        }
    }

    async fn poll(
        &self,
        provider_job_id: &str,
        label: &str,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> PollEnd {
        let timeout = self.polling.poll_timeout();
        let mut interval = self.polling.initial_interval();
        let mut waited = Duration::ZERO;

        loop {
            if waited >= timeout {
                return PollEnd::Failed(format!("no final state after {:?}", waited));
            }
            let wait = interval.min(timeout - waited);
            tokio::select! {
                _ = cancel.cancelled() => return PollEnd::Cancelled,
                _ = self.sleeper.sleep(wait) => {}
            }
            waited += wait;
            interval = (interval * 2).min(self.polling.max_interval());

            if cancel.is_cancelled() {
                return PollEnd::Cancelled;
            }

            match self.batch.status(provider_job_id).await {
                Ok(status) => {
                    debug!(
                        "Batch {} is {} ({}/{})",
                        provider_job_id, status.state, status.completed, status.total
                    );
                    progress.emit(label, status.completed, status.total);
                    if status.state.is_terminal() {
                        return PollEnd::Finished(status);
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!("Status query for batch {} failed, will retry: {}", provider_job_id, e);
                }
                Err(e) => return PollEnd::Failed(format!("status query failed: {}", e)),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn fall_back<S: Stage>(
        &self,
        stage: &S,
        captions: &[CaptionUnit],
        mut job: ProcessingJob<S::Output>,
        batch_resolved: usize,
        executor: &ConcurrentExecutor,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome<S::Output>, ExtractorError> {
        let unresolved = job.unresolved();
        let pending: Vec<CaptionUnit> = captions
            .iter()
            .filter(|c| unresolved.contains(&c.id))
            .cloned()
            .collect();

        if !pending.is_empty() {
            info!(
                "Falling back to concurrent {} for {} unresolved captions",
                stage.name(),
                pending.len()
            );
        }
        let results = executor.run(stage, &pending, progress, cancel).await;
        for (caption, outcome) in pending.iter().zip(results) {
            job.resolve(&caption.id, outcome);
        }
        job.transition(JobState::FallbackConcurrent)?;

        Ok(BatchOutcome {
            job,
            batch_resolved,
            fallback_count: pending.len(),
        })
    }

    fn finish(&self, fingerprint: &str, final_state: &str) {
        if let Err(e) = self.journal.mark_finished(fingerprint, final_state) {
            warn!("Failed to mark batch journal entry finished: {}", e);
        }
    }
}

/// Resolve captions from output lines; returns how many were newly resolved
fn reconcile<S: Stage>(
    stage: &S,
    captions: &[CaptionUnit],
    job: &mut ProcessingJob<S::Output>,
    lines: Vec<BatchResultLine>,
) -> usize {
    let by_index: HashMap<usize, &CaptionUnit> = captions.iter().enumerate().collect();
    let mut resolved = 0;

    for line in lines {
        let Some(caption) = request_index(&line.custom_id).and_then(|i| by_index.get(&i)) else {
            warn!("Ignoring output line with unknown id {}", line.custom_id);
            continue;
        };
        let outcome = match line.outcome {
            Ok(body) => stage.parse(caption, &body),
            Err(message) => Err(ExtractionError::rejected(message)),
        };
        if job.resolve(&caption.id, outcome) {
            resolved += 1;
        }
    }
    resolved
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
