//! Ricettario Extractor
//!
//! Turns social-media captions into structured recipes with an LLM, at
//! collection scale.
//!
//! # Overview
//!
//! The engine decides how to schedule hundreds of model calls, runs them
//! either as one discounted bulk job or as bounded-parallel immediate calls,
//! survives partial failures, skips captions it has already seen and records
//! every run in the history ledger.
//!
//! # Architecture
//!
//! ```text
//! Captions → Cache → Planner → Classification → Extraction → Cache + Ledger
//!                                 (batch job or concurrent executor)
//! ```
//!
//! # Key Features
//!
//! - **Mode planning**: batch vs concurrent, with cost and latency estimates
//! - **Batch jobs**: journaled submission, capped exponential polling,
//!   fallback of unresolved captions
//! - **Concurrent executor**: bounded in-flight calls, retry with jitter
//! - **Content-addressed cache**: a caption seen before costs nothing
//! - **Run history**: append-only records and run-to-run comparison
//!
//! # Example Usage
//!
//! ```no_run
//! use ricettario_domain::CaptionUnit;
//! use ricettario_extractor::{Engine, EngineConfig, ProgressSink, RunRequest};
//! use ricettario_llm::MockProvider;
//! use ricettario_store::SqliteStore;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let llm = Arc::new(MockProvider::new(r#"{"is_recipe": false, "confidence": 0.9}"#));
//! let store = Arc::new(SqliteStore::new(":memory:")?);
//! let engine = Engine::new(llm, store, EngineConfig::default())?;
//!
//! let request = RunRequest::new(vec![CaptionUnit::new("1", "Happy birthday!")]);
//! let report = engine
//!     .run(request, ProgressSink::disabled(), CancellationToken::new())
//!     .await?;
//!
//! println!("Accepted: {}", report.record.accepted_count);
//! println!("Rejected: {}", report.record.rejected_count);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod batch;
mod clock;
mod config;
mod engine;
mod error;
mod executor;
mod parser;
mod pipeline;
mod planner;
mod progress;
mod prompt;

#[cfg(test)]
mod tests;

pub use batch::{build_manifest, manifest_fingerprint, BatchJobManager, BatchOutcome};
pub use clock::{Sleeper, TokioSleeper};
pub use config::{EngineConfig, PollingConfig, PricingConfig, RetryConfig};
pub use engine::{CaptionOutcome, CaptionStatus, Engine, RunReport, RunRequest};
pub use error::ExtractorError;
pub use executor::ConcurrentExecutor;
pub use parser::{parse_classification, parse_extraction};
pub use pipeline::{call_stage, CallError, ClassificationStage, ExtractionStage, Pipeline, Stage};
pub use planner::{LatencyEstimator, ModePlan, ModePlanner};
pub use progress::{ProgressEvent, ProgressSink};
pub use prompt::{PromptTemplates, EXTRACT_DETAILS_FILE, IS_RECIPE_FILE};
