//! Trait definitions for persisted state
//!
//! These traits define the boundaries between the engine and storage.
//! Implementations live in other crates (ricettario-store). All methods take
//! `&self` so a single store can be shared between concurrent workers.

use crate::{ExtractionRecord, HistoryExport, RunComparison, RunId, RunRecord, TrendAnalysis};

const SECONDS_PER_DAY: u64 = 86_400;

/// Content-addressed, write-once store of extraction records
///
/// Keys are normalized caption texts; implementations hash them.
pub trait RecipeCache {
    /// Error type for cache operations
    type Error;

    /// Look up the record for a normalized caption
    fn get(&self, normalized_caption: &str) -> Result<Option<ExtractionRecord>, Self::Error>;

    /// Store a record; returns `false` if the key already had one
    fn put(&self, normalized_caption: &str, record: &ExtractionRecord) -> Result<bool, Self::Error>;

    /// Number of cached entries
    fn len(&self) -> Result<usize, Self::Error>;

    /// Whether the cache holds no entries
    fn is_empty(&self) -> Result<bool, Self::Error> {
        Ok(self.len()? == 0)
    }
}

/// Append-only history of runs
pub trait RunLedger {
    /// Error type for ledger operations
    type Error;

    /// Append a record
    fn append(&self, record: &RunRecord) -> Result<(), Self::Error>;

    /// The `n` most recent records, newest first
    fn latest(&self, n: usize) -> Result<Vec<RunRecord>, Self::Error>;

    /// Fetch one record
    fn get_run(&self, run_id: RunId) -> Result<Option<RunRecord>, Self::Error>;

    /// Compare two runs as `b - a`; fails when either id is unknown
    fn compare(&self, run_a: RunId, run_b: RunId) -> Result<RunComparison, Self::Error>;

    /// Records with `timestamp >= since`, oldest first
    fn since(&self, since: u64) -> Result<Vec<RunRecord>, Self::Error>;

    /// Trend over the `days` days before `now`; `None` when no run falls inside
    fn trend(&self, days: u32, now: u64) -> Result<Option<TrendAnalysis>, Self::Error> {
        let cutoff = now.saturating_sub(u64::from(days) * SECONDS_PER_DAY);
        Ok(TrendAnalysis::from_runs(days, &self.since(cutoff)?))
    }

    /// Every record plus summary aggregates
    fn export(&self, now: u64) -> Result<HistoryExport, Self::Error> {
        Ok(HistoryExport::new(self.since(0)?, now))
    }
}

/// A submitted batch job as remembered by the journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Fingerprint of the submitted manifest
    pub manifest_fingerprint: String,
    /// Provider-side job identifier
    pub provider_job_id: String,
    /// Number of requests in the manifest
    pub request_count: usize,
    /// Submission time (seconds since epoch)
    pub submitted_at: u64,
}

/// Durable map from manifest fingerprint to provider job id
///
/// Lets a restarted run resume polling a job it already paid for instead of
/// submitting the same manifest again.
pub trait JobJournal {
    /// Error type for journal operations
    type Error;

    /// Remember a freshly submitted job
    fn record_submission(&self, entry: &JournalEntry) -> Result<(), Self::Error>;

    /// Find an unfinished job for this manifest
    fn find_unfinished(&self, manifest_fingerprint: &str) -> Result<Option<JournalEntry>, Self::Error>;

    /// Mark the job for this manifest as finished with a final state name
    fn mark_finished(&self, manifest_fingerprint: &str, final_state: &str) -> Result<(), Self::Error>;
}
