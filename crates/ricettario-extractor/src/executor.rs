//! Bounded-parallel execution of one stage over many captions
//!
//! At most `concurrency` calls are in flight at any time. Transient failures
//! retry with exponential backoff and jitter; everything else resolves the
//! caption immediately. Results come back in input order.

use crate::config::{EngineConfig, RetryConfig};
use crate::pipeline::{call_stage, CallError, Stage};
use crate::planner::LatencyEstimator;
use crate::progress::ProgressSink;
use futures::stream::{self, StreamExt};
use rand::Rng;
use ricettario_domain::{CaptionUnit, ExtractionError};
use ricettario_llm::{CompletionService, LlmError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs a stage over a set of captions with bounded parallelism
pub struct ConcurrentExecutor {
    llm: Arc<dyn CompletionService>,
    concurrency: usize,
    retry: RetryConfig,
    call_timeout: Duration,
    latency: Arc<LatencyEstimator>,
}

impl ConcurrentExecutor {
    /// Create an executor from the engine configuration
    pub fn new(
        llm: Arc<dyn CompletionService>,
        config: &EngineConfig,
        latency: Arc<LatencyEstimator>,
    ) -> Self {
        Self {
            llm,
            concurrency: config.concurrency.max(1),
            retry: config.retry.clone(),
            call_timeout: config.call_timeout(),
            latency,
        }
    }

    /// Run `stage` over every caption
    ///
    /// Returns one outcome per caption, in the order of `captions`. Once
    /// `cancel` fires no new call is started; captions that never got a call
    /// resolve to `Cancelled`.
    pub async fn run<S: Stage>(
        &self,
        stage: &S,
        captions: &[CaptionUnit],
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Vec<Result<S::Output, ExtractionError>> {
        let total = captions.len();
        if total == 0 {
            return Vec::new();
        }
        info!(
            "Starting {} for {} captions (concurrency {})",
            stage.name(),
            total,
            self.concurrency
        );

        let completed = AtomicUsize::new(0);
        let completed = &completed;
        let mut results: Vec<(usize, Result<S::Output, ExtractionError>)> =
            stream::iter(captions.iter().enumerate())
                .map(|(index, caption)| async move {
                    let outcome = self.call_with_retry(stage, caption, cancel).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.emit(stage.name(), done, total);
                    (index, outcome)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn call_with_retry<S: Stage>(
        &self,
        stage: &S,
        caption: &CaptionUnit,
        cancel: &CancellationToken,
    ) -> Result<S::Output, ExtractionError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(ExtractionError::cancelled());
            }
            attempt += 1;

            let started = Instant::now();
            let call = call_stage(self.llm.as_ref(), stage, caption);
            let error = match tokio::time::timeout(self.call_timeout, call).await {
                Ok(Ok(output)) => {
                    self.latency.observe(started.elapsed());
                    return Ok(output);
                }
                Ok(Err(CallError::Permanent(e))) => {
                    debug!("{} failed for caption {}: {}", stage.name(), caption.id, e);
                    return Err(e);
                }
                Ok(Err(CallError::Transient(e))) => e,
                Err(_) => LlmError::Timeout,
            };

            if attempt >= self.retry.max_attempts {
                warn!(
                    "{} for caption {} gave up after {} attempts: {}",
                    stage.name(),
                    caption.id,
                    attempt,
                    error
                );
                return Err(ExtractionError::retries_exhausted(attempt, &error));
            }

            let delay = jittered(self.retry.backoff(attempt), self.retry.jitter);
            debug!(
                "Retrying {} for caption {} in {:?} (attempt {} failed: {})",
                stage.name(),
                caption.id,
                delay,
                attempt,
                error
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(ExtractionError::cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Add up to 25% random jitter
fn jittered(delay: Duration, jitter: bool) -> Duration {
    if !jitter || delay.is_zero() {
        return delay;
    }
    let factor: f64 = rand::thread_rng().gen_range(0.0..=0.25);
    delay + delay.mul_f64(factor)
}
