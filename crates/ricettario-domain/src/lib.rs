//! Ricettario Domain Layer
//!
//! This crate contains the data model shared by every other Ricettario crate.
//! It defines the value objects that flow through an extraction run and the
//! trait interfaces the engine uses to reach persisted state.
//!
//! ## Key Concepts
//!
//! - **Caption**: raw text of a social post, the unit of work
//! - **Classification**: the is-this-a-recipe decision for one caption
//! - **Extraction record**: the structured recipe produced for an accepted caption
//! - **Processing job**: a set of captions moving through the batch state machine
//! - **Run record**: the accounting of one end-to-end invocation
//! - **Trend / export**: aggregates over the run history
//!
//! ## Architecture
//!
//! - Only `serde` and `uuid` as external dependencies
//! - No I/O; storage and model access live in other crates
//! - Trait definitions for the cache, the history ledger and the job journal

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod caption;
pub mod classification;
pub mod history;
pub mod job;
pub mod outcome;
pub mod recipe;
pub mod run;
pub mod terms;
pub mod traits;

// Re-exports for convenience
pub use caption::{CaptionId, CaptionUnit};
pub use classification::{ClassificationResult, DEFAULT_MIN_CONFIDENCE};
pub use job::{InvalidTransition, JobId, JobState, ProcessingJob};
pub use outcome::{ExtractionError, ExtractionErrorKind};
pub use recipe::{CuisineType, Difficulty, DishType, ExtractionRecord, MealType, RecipeOutput};
pub use history::{CostTrend, HistoryExport, HistorySummary, MetricTrend, TrendAnalysis};
pub use run::{
    ConfidenceDistribution, ExecutionMode, ProcessingMode, RunComparison, RunDetails, RunId,
    RunRecord, MAX_RECORDED_ERRORS,
};
pub use terms::{normalize_record, normalize_term, normalize_terms};
pub use traits::{JobJournal, JournalEntry, RecipeCache, RunLedger};
