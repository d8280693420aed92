//! The extraction engine
//!
//! A run goes through these steps:
//!
//! 1. look every caption up in the cache
//! 2. plan: bind the run to batch or concurrent execution
//! 3. classify the uncached captions
//! 4. extract the accepted ones
//! 5. merge confidence, normalize terminology, cache new records
//! 6. account for every caption and append a record to the history ledger

use crate::batch::BatchJobManager;
use crate::clock::{Sleeper, TokioSleeper};
use crate::config::EngineConfig;
use crate::error::ExtractorError;
use crate::executor::ConcurrentExecutor;
use crate::pipeline::{ClassificationStage, ExtractionStage, Stage};
use crate::planner::{LatencyEstimator, ModePlan, ModePlanner};
use crate::progress::ProgressSink;
use crate::prompt::PromptTemplates;
use ricettario_domain::{
    normalize_record, CaptionId, CaptionUnit, ClassificationResult, ExecutionMode,
    ExtractionError, ExtractionErrorKind, ExtractionRecord, JobJournal, ProcessingMode,
    RecipeCache, RecipeOutput, RunDetails, RunId, RunLedger, RunRecord,
};
use ricettario_llm::{BatchService, CompletionService};
use ricettario_store::normalize_caption;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What to process and how
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Captions in output order
    pub captions: Vec<CaptionUnit>,
    /// Requested execution mode
    pub mode: ProcessingMode,
    /// Consult and fill the cache (also requires `EngineConfig::use_cache`)
    pub use_cache: bool,
    /// Skip classification and extract every caption
    pub force_extraction: bool,
}

impl RunRequest {
    /// Auto mode, cache on, classification on
    pub fn new(captions: Vec<CaptionUnit>) -> Self {
        Self {
            captions,
            mode: ProcessingMode::Auto,
            use_cache: true,
            force_extraction: false,
        }
    }

    /// Request a specific mode
    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bypass the cache for this run
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Extract every caption without classifying first
    pub fn force_extraction(mut self) -> Self {
        self.force_extraction = true;
        self
    }
}

/// Final state of one caption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionStatus {
    /// Answered from the cache
    Cached,
    /// Classified as a recipe and extracted
    Accepted,
    /// Classified as not a recipe (or below the confidence floor)
    Rejected,
    /// Ended in an extraction error
    Errored,
}

/// Accounting for one caption
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionOutcome {
    /// Caption id
    pub caption_id: CaptionId,
    /// Final state
    pub status: CaptionStatus,
    /// Classification, when one was made
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationResult>,
    /// Error, for errored captions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExtractionError>,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Record appended to the history ledger
    pub record: RunRecord,
    /// Plan the run was bound to
    pub plan: ModePlan,
    /// One entry per input caption, in input order
    pub outcomes: Vec<CaptionOutcome>,
    /// Extracted and cached recipes, in input order
    pub recipes: Vec<RecipeOutput>,
}

impl RunReport {
    /// Captions that ended in an error
    pub fn errors(&self) -> impl Iterator<Item = (&CaptionId, &ExtractionError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| (&o.caption_id, e)))
    }
}

/// Request counts used for cost accounting
#[derive(Debug, Default)]
struct Tally {
    standard_requests: usize,
    batch_requests: usize,
    fallback_count: usize,
}

/// Orchestrates classification and extraction runs
pub struct Engine<S> {
    llm: Arc<dyn CompletionService>,
    batch: Option<Arc<dyn BatchService>>,
    store: Arc<S>,
    config: EngineConfig,
    templates: Arc<PromptTemplates>,
    sleeper: Arc<dyn Sleeper>,
    latency: Arc<LatencyEstimator>,
}

impl<S> Engine<S>
where
    S: RecipeCache + RunLedger + JobJournal + Send + Sync,
    <S as RecipeCache>::Error: Display,
    <S as RunLedger>::Error: Display,
    <S as JobJournal>::Error: Display,
{
    /// Create an engine
    ///
    /// Validates the configuration and loads prompt overrides. The latency
    /// estimate is seeded from the most recent run when there is one.
    pub fn new(
        llm: Arc<dyn CompletionService>,
        store: Arc<S>,
        config: EngineConfig,
    ) -> Result<Self, ExtractorError> {
        config.validate().map_err(ExtractorError::Config)?;

        let templates = match &config.prompts_dir {
            Some(dir) => PromptTemplates::load(dir)?,
            None => PromptTemplates::default(),
        };

        let seed_ms = match store.latest(1) {
            Ok(records) => records
                .first()
                .map(|r| r.avg_call_latency_ms)
                .filter(|ms| *ms > 0.0)
                .unwrap_or(config.pricing.default_call_latency_ms as f64),
            Err(e) => {
                debug!("Could not read run history for latency seed: {}", e);
                config.pricing.default_call_latency_ms as f64
            }
        };

        Ok(Self {
            llm,
            batch: None,
            store,
            config,
            templates: Arc::new(templates),
            sleeper: Arc::new(TokioSleeper),
            latency: Arc::new(LatencyEstimator::new(Duration::from_secs_f64(seed_ms / 1000.0))),
        })
    }

    /// Enable batch mode
    pub fn with_batch_service(mut self, batch: Arc<dyn BatchService>) -> Self {
        self.batch = Some(batch);
        self
    }

    /// Replace the sleeper used for poll waits
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace the prompt templates
    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = Arc::new(templates);
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Prompt templates in use
    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    /// Current rolling per-call latency
    pub fn latency_estimate(&self) -> Duration {
        self.latency.current()
    }

    /// Plan a run without making any model call
    pub fn plan(&self, request: &RunRequest) -> Result<ModePlan, ExtractorError> {
        let cached = self.lookup_cache(&request.captions, self.cache_enabled(request));
        let pending = request.captions.iter().filter(|c| !c.is_blank()).count();
        let hits = cached.iter().filter(|c| c.is_some()).count();
        self.planner().plan(request.mode, pending, hits, self.latency.current())
    }

    /// Run classification and extraction over the request's captions
    pub async fn run(
        &self,
        request: RunRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<RunReport, ExtractorError> {
        let started = Instant::now();
        let timestamp = now_secs();
        let run_id = RunId::new();
        let captions = &request.captions;
        check_unique_ids(captions)?;

        let use_cache = self.cache_enabled(&request);
        let cached = self.lookup_cache(captions, use_cache);
        let pending = captions.iter().filter(|c| !c.is_blank()).count();
        let hits = cached.iter().filter(|c| c.is_some()).count();

        let plan = self
            .planner()
            .plan(request.mode, pending, hits, self.latency.current())?;
        let mode = plan.recommended_mode;
        info!(
            "Starting run {} over {} captions: {} ({})",
            run_id,
            captions.len(),
            mode,
            plan.reasoning
        );

        // Indices of captions that need model calls
        let work: Vec<usize> = (0..captions.len())
            .filter(|&i| cached[i].is_none() && !captions[i].is_blank())
            .collect();
        let mut tally = Tally::default();

        let mut classifications: Vec<Option<Result<ClassificationResult, ExtractionError>>> =
            vec![None; captions.len()];
        if !request.force_extraction {
            let units: Vec<CaptionUnit> = work.iter().map(|&i| captions[i].clone()).collect();
            let stage = ClassificationStage::new(Arc::clone(&self.templates));
            let results = self
                .run_stage(mode, &stage, &units, &progress, &cancel, &mut tally)
                .await?;
            for (&i, result) in work.iter().zip(results) {
                classifications[i] = Some(result);
            }
        }

        let min_confidence = self.config.min_confidence;
        let accepted: Vec<usize> = work
            .iter()
            .copied()
            .filter(|&i| match &classifications[i] {
                None => true,
                Some(Ok(c)) => c.is_accepted(min_confidence),
                Some(Err(_)) => false,
            })
            .collect();
        debug!("{} of {} captions accepted for extraction", accepted.len(), work.len());

        let mut extractions: Vec<Option<Result<ExtractionRecord, ExtractionError>>> =
            vec![None; captions.len()];
        if !accepted.is_empty() {
            let units: Vec<CaptionUnit> = accepted.iter().map(|&i| captions[i].clone()).collect();
            let stage = ExtractionStage::new(Arc::clone(&self.templates));
            let results = self
                .run_stage(mode, &stage, &units, &progress, &cancel, &mut tally)
                .await?;
            for (&i, result) in accepted.iter().zip(results) {
                extractions[i] = Some(result);
            }
        }

        let mut outcomes = Vec::with_capacity(captions.len());
        let mut recipes = Vec::new();
        for (i, caption) in captions.iter().enumerate() {
            if let Some(record) = cached[i].clone() {
                recipes.push(RecipeOutput::new(caption, record));
                outcomes.push(CaptionOutcome {
                    caption_id: caption.id.clone(),
                    status: CaptionStatus::Cached,
                    classification: None,
                    error: None,
                });
                continue;
            }
            if caption.is_blank() {
                outcomes.push(CaptionOutcome {
                    caption_id: caption.id.clone(),
                    status: CaptionStatus::Rejected,
                    classification: Some(ClassificationResult::rejected(
                        caption.id.clone(),
                        "empty caption",
                    )),
                    error: None,
                });
                continue;
            }

            let classification = match classifications[i].take() {
                Some(Err(e)) => {
                    outcomes.push(errored(caption, None, e));
                    continue;
                }
                Some(Ok(c)) => Some(c),
                None => None,
            };

            match extractions[i].take() {
                None => outcomes.push(CaptionOutcome {
                    caption_id: caption.id.clone(),
                    status: CaptionStatus::Rejected,
                    classification,
                    error: None,
                }),
                Some(Err(e)) => outcomes.push(errored(caption, classification, e)),
                Some(Ok(record)) => {
                    let record = match &classification {
                        Some(c) => record.with_min_confidence(c.confidence),
                        None => record,
                    };
                    let record = normalize_record(record);
                    if use_cache {
                        self.store_in_cache(caption, &record);
                    }
                    recipes.push(RecipeOutput::new(caption, record));
                    outcomes.push(CaptionOutcome {
                        caption_id: caption.id.clone(),
                        status: CaptionStatus::Accepted,
                        classification,
                        error: None,
                    });
                }
            }
        }

        let record = self.build_record(RecordInputs {
            run_id,
            timestamp,
            mode,
            outcomes: &outcomes,
            recipes: &recipes,
            tally: &tally,
            duration: started.elapsed(),
            cancelled: cancel.is_cancelled(),
        });
        self.store
            .append(&record)
            .map_err(|e| ExtractorError::Ledger(e.to_string()))?;

        info!(
            "Run {} finished: {} accepted, {} rejected, {} errored, {} cached, ${:.4} in {:.1}s",
            record.run_id,
            record.accepted_count,
            record.rejected_count,
            record.errored_count,
            record.cache_hits,
            record.total_cost_estimate,
            record.duration_seconds
        );

        Ok(RunReport {
            record,
            plan,
            outcomes,
            recipes,
        })
    }

    async fn run_stage<St: Stage>(
        &self,
        mode: ExecutionMode,
        stage: &St,
        captions: &[CaptionUnit],
        progress: &ProgressSink,
        cancel: &CancellationToken,
        tally: &mut Tally,
    ) -> Result<Vec<Result<St::Output, ExtractionError>>, ExtractorError> {
        if captions.is_empty() {
            return Ok(Vec::new());
        }
        let executor = ConcurrentExecutor::new(
            Arc::clone(&self.llm),
            &self.config,
            Arc::clone(&self.latency),
        );

        match (mode, &self.batch) {
            (ExecutionMode::Batch, Some(batch)) => {
                let manager = BatchJobManager::new(
                    Arc::clone(batch),
                    Arc::clone(&self.store),
                    self.config.polling.clone(),
                    Arc::clone(&self.sleeper),
                );
                let outcome = manager.run(stage, captions, &executor, progress, cancel).await?;
                tally.batch_requests += outcome.batch_resolved;
                tally.fallback_count += outcome.fallback_count;
                let fallback = outcome.fallback_count;
                let results = outcome.into_results();
                tally.standard_requests += fallback.saturating_sub(count_cancelled(&results));
                Ok(results)
            }
            (ExecutionMode::Batch, None) => Err(ExtractorError::Config(
                "batch mode requested but no batch service is configured".to_string(),
            )),
            (ExecutionMode::Concurrent, _) => {
                let results = executor.run(stage, captions, progress, cancel).await;
                tally.standard_requests += results.len() - count_cancelled(&results);
                Ok(results)
            }
        }
    }

    fn planner(&self) -> ModePlanner {
        ModePlanner::new(&self.config, self.batch.is_some())
    }

    fn cache_enabled(&self, request: &RunRequest) -> bool {
        self.config.use_cache && request.use_cache
    }

    fn lookup_cache(&self, captions: &[CaptionUnit], use_cache: bool) -> Vec<Option<ExtractionRecord>> {
        captions
            .iter()
            .map(|caption| {
                if !use_cache || caption.is_blank() {
                    return None;
                }
                match self.store.get(&normalize_caption(&caption.raw_text)) {
                    Ok(hit) => hit,
                    Err(e) => {
                        warn!("Cache read failed for caption {}, treating as miss: {}", caption.id, e);
                        None
                    }
                }
            })
            .collect()
    }

    fn store_in_cache(&self, caption: &CaptionUnit, record: &ExtractionRecord) {
        match self.store.put(&normalize_caption(&caption.raw_text), record) {
            Ok(true) => {}
            Ok(false) => debug!("Caption {} was already cached", caption.id),
            Err(e) => warn!("Cache write failed for caption {}: {}", caption.id, e),
        }
    }

    fn build_record(&self, inputs: RecordInputs<'_>) -> RunRecord {
        let count = |status: CaptionStatus| inputs.outcomes.iter().filter(|o| o.status == status).count();
        let total = inputs.outcomes.len();
        let errored_count = count(CaptionStatus::Errored);

        let average_confidence = if inputs.recipes.is_empty() {
            0.0
        } else {
            inputs
                .recipes
                .iter()
                .map(|r| r.record.confidence_score)
                .sum::<f64>()
                / inputs.recipes.len() as f64
        };

        let request_cost = self.config.pricing.request_cost();
        let total_cost_estimate = inputs.tally.standard_requests as f64 * request_cost
            + inputs.tally.batch_requests as f64 * request_cost * self.config.pricing.batch_discount;

        RunRecord {
            run_id: inputs.run_id,
            timestamp: inputs.timestamp,
            total_captions: total,
            accepted_count: inputs.recipes.len(),
            rejected_count: count(CaptionStatus::Rejected),
            errored_count,
            cache_hits: count(CaptionStatus::Cached),
            mode_used: inputs.mode,
            total_cost_estimate,
            success_rate: RunRecord::compute_success_rate(total, errored_count),
            model_name: self.llm.model_name().to_string(),
            average_confidence,
            duration_seconds: inputs.duration.as_secs_f64(),
            avg_call_latency_ms: self.latency.current_ms(),
            fallback_count: inputs.tally.fallback_count,
            cancelled: inputs.cancelled,
            prompt_fingerprint: self.templates.fingerprint(),
            details: RunDetails::collect(
                inputs.recipes.iter().map(|r| &r.record),
                inputs.outcomes.iter().filter_map(|o| {
                    o.error
                        .as_ref()
                        .map(|e| format!("{}: {}", o.caption_id, e))
                }),
            ),
        }
    }
}

struct RecordInputs<'a> {
    run_id: RunId,
    timestamp: u64,
    mode: ExecutionMode,
    outcomes: &'a [CaptionOutcome],
    recipes: &'a [RecipeOutput],
    tally: &'a Tally,
    duration: Duration,
    cancelled: bool,
}

fn errored(
    caption: &CaptionUnit,
    classification: Option<ClassificationResult>,
    error: ExtractionError,
) -> CaptionOutcome {
    CaptionOutcome {
        caption_id: caption.id.clone(),
        status: CaptionStatus::Errored,
        classification,
        error: Some(error),
    }
}

fn count_cancelled<T>(results: &[Result<T, ExtractionError>]) -> usize {
    results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind == ExtractionErrorKind::Cancelled))
        .count()
}

fn check_unique_ids(captions: &[CaptionUnit]) -> Result<(), ExtractorError> {
    let mut seen = HashSet::with_capacity(captions.len());
    for caption in captions {
        if !seen.insert(&caption.id) {
            return Err(ExtractorError::InvalidInput(format!(
                "duplicate caption id {}",
                caption.id
            )));
        }
    }
    Ok(())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
