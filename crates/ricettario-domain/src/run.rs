//! Run module - per-invocation accounting kept by the history ledger

use crate::ExtractionRecord;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Most error messages kept on one record
pub const MAX_RECORDED_ERRORS: usize = 10;

/// Identifier of a run based on UUIDv7
///
/// UUIDv7 ids sort chronologically, so ordering run ids orders runs by start
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u128);

impl RunId {
    /// Generate a new UUIDv7-based RunId
    ///
    /// # Examples
    ///
    /// ```
    /// use ricettario_domain::RunId;
    ///
    /// let a = RunId::new();
    /// let b = RunId::new();
    /// assert!(a < b);
    /// ```
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().as_u128())
    }

    /// Create a RunId from a raw u128 value
    pub fn from_value(value: u128) -> Self {
        Self(value)
    }

    /// Parse a RunId from its hyphenated string form
    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(|u| Self(u.as_u128()))
            .map_err(|e| format!("Invalid run id: {}", e))
    }

    /// Get the raw u128 value
    pub fn value(&self) -> u128 {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_u128(self.0))
    }
}

impl std::str::FromStr for RunId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl Serialize for RunId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_string(&s).map_err(serde::de::Error::custom)
    }
}

/// Mode requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Let the planner decide
    #[default]
    Auto,
    /// Force the discounted bulk endpoint
    Batch,
    /// Force bounded-parallel immediate calls
    Concurrent,
}

impl ProcessingMode {
    /// Get the mode name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Auto => "auto",
            ProcessingMode::Batch => "batch",
            ProcessingMode::Concurrent => "concurrent",
        }
    }

    /// Parse a mode from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(ProcessingMode::Auto),
            "batch" => Some(ProcessingMode::Batch),
            "concurrent" => Some(ProcessingMode::Concurrent),
            _ => None,
        }
    }
}

impl std::str::FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid processing mode: {}", s))
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy a run is bound to once planning is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Bulk asynchronous job
    Batch,
    /// Immediate calls through the bounded executor
    Concurrent,
}

impl ExecutionMode {
    /// Get the mode name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Batch => "batch",
            ExecutionMode::Concurrent => "concurrent",
        }
    }

    /// Parse a mode from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "batch" => Some(ExecutionMode::Batch),
            "concurrent" => Some(ExecutionMode::Concurrent),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one completed run
///
/// Records are append-only; nothing rewrites a record once the ledger has it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique, chronologically sortable id
    pub run_id: RunId,
    /// Start of the run (seconds since epoch)
    pub timestamp: u64,
    /// Captions fed into the run
    pub total_captions: usize,
    /// Captions that produced a recipe
    pub accepted_count: usize,
    /// Captions classified as not a recipe
    pub rejected_count: usize,
    /// Captions that ended in an error
    pub errored_count: usize,
    /// Captions answered from the cache
    pub cache_hits: usize,
    /// Strategy the run was bound to
    pub mode_used: ExecutionMode,
    /// Estimated spend in USD
    pub total_cost_estimate: f64,
    /// Fraction of captions that reached a non-error terminal state
    pub success_rate: f64,
    /// Model used for completions
    pub model_name: String,
    /// Mean confidence over accepted recipes (0.0 when none)
    pub average_confidence: f64,
    /// Wall-clock duration
    pub duration_seconds: f64,
    /// Rolling per-call latency at the end of the run
    pub avg_call_latency_ms: f64,
    /// Captions re-dispatched after a batch failure
    pub fallback_count: usize,
    /// Whether the run was aborted by the caller
    pub cancelled: bool,
    /// Fingerprint of the prompt templates in use
    pub prompt_fingerprint: String,
    /// Tag usage, confidence buckets and sampled errors
    #[serde(flatten)]
    pub details: RunDetails,
}

impl RunRecord {
    /// `(total - errored) / total`, or 1.0 for an empty run
    pub fn compute_success_rate(total: usize, errored: usize) -> f64 {
        if total == 0 {
            return 1.0;
        }
        total.saturating_sub(errored) as f64 / total as f64
    }
}

/// Vocabulary lists counted into `RunDetails::tag_counts`
fn tag_lists(record: &ExtractionRecord) -> [(&'static str, &[String]); 7] {
    [
        ("proteins", record.proteins.as_slice()),
        ("vegetables", record.vegetables.as_slice()),
        ("key_ingredients", record.key_ingredients.as_slice()),
        ("cooking_method", record.cooking_method.as_slice()),
        ("equipment", record.equipment.as_slice()),
        ("dietary_tags", record.dietary_tags.as_slice()),
        ("occasion_tags", record.occasion_tags.as_slice()),
    ]
}

/// Recipe counts per confidence bucket
///
/// High is above 0.8, medium above 0.6, everything else is low.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceDistribution {
    /// Confidence above 0.8
    pub high: usize,
    /// Confidence in (0.6, 0.8]
    pub medium: usize,
    /// Confidence at or below 0.6
    pub low: usize,
}

impl ConfidenceDistribution {
    /// Count one score into its bucket
    pub fn add(&mut self, confidence: f64) {
        if confidence > 0.8 {
            self.high += 1;
        } else if confidence > 0.6 {
            self.medium += 1;
        } else {
            self.low += 1;
        }
    }
}

/// Per-run detail used for regression comparison
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDetails {
    /// `category:term` keys (e.g. `proteins:chicken`) to number of recipes using them
    #[serde(default)]
    pub tag_counts: BTreeMap<String, usize>,
    /// Recipes per confidence bucket
    #[serde(default)]
    pub confidence_distribution: ConfidenceDistribution,
    /// First few error messages of the run
    #[serde(default)]
    pub extraction_errors: Vec<String>,
}

impl RunDetails {
    /// Collect details from the emitted recipes and the run's error messages
    ///
    /// Only the first `MAX_RECORDED_ERRORS` errors are kept.
    pub fn collect<'a>(
        records: impl IntoIterator<Item = &'a ExtractionRecord>,
        errors: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut details = Self::default();
        for record in records {
            details.confidence_distribution.add(record.confidence_score);
            for (category, terms) in tag_lists(record) {
                for term in terms {
                    *details
                        .tag_counts
                        .entry(format!("{}:{}", category, term))
                        .or_insert(0) += 1;
                }
            }
        }
        details.extraction_errors = errors.into_iter().take(MAX_RECORDED_ERRORS).collect();
        details
    }

    /// The `n` most used tags, highest count first
    pub fn top_tags(&self, n: usize) -> Vec<(&str, usize)> {
        let mut tags: Vec<_> = self.tag_counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        tags.truncate(n);
        tags
    }
}

/// Difference between two runs, computed as `b - a`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunComparison {
    /// Baseline run
    pub run_a: RunId,
    /// Compared run
    pub run_b: RunId,
    /// Change in success rate
    pub success_rate_change: f64,
    /// Change in estimated cost
    pub cost_change: f64,
    /// Change in accepted recipe count
    pub count_change: i64,
    /// Change in average confidence
    pub confidence_change: f64,
    /// Change in duration (seconds)
    pub duration_change: f64,
    /// Whether the prompt templates differ between the two runs
    pub prompt_changed: bool,
    /// Tags present in `b` but not in `a`, sorted
    pub new_tags_found: Vec<String>,
    /// Tags present in both whose count grew, with the increase
    pub improved_tag_counts: BTreeMap<String, usize>,
    /// Weighted 0-100 score; 50 means no change
    pub improvement_score: f64,
    /// Human-readable advice derived from the deltas
    pub recommendations: Vec<String>,
}

impl RunComparison {
    /// Compare `b` against baseline `a`
    pub fn between(a: &RunRecord, b: &RunRecord) -> Self {
        let before = &a.details.tag_counts;
        let after = &b.details.tag_counts;

        let new_tags_found: Vec<String> = after
            .keys()
            .filter(|tag| !before.contains_key(*tag))
            .cloned()
            .collect();
        let improved_tag_counts: BTreeMap<String, usize> = after
            .iter()
            .filter_map(|(tag, count)| {
                let old = before.get(tag)?;
                (count > old).then(|| (tag.clone(), count - old))
            })
            .collect();

        let success_rate_change = b.success_rate - a.success_rate;
        let confidence_change = b.average_confidence - a.average_confidence;

        Self {
            run_a: a.run_id,
            run_b: b.run_id,
            success_rate_change,
            cost_change: b.total_cost_estimate - a.total_cost_estimate,
            count_change: b.accepted_count as i64 - a.accepted_count as i64,
            confidence_change,
            duration_change: b.duration_seconds - a.duration_seconds,
            prompt_changed: a.prompt_fingerprint != b.prompt_fingerprint,
            improvement_score: improvement_score(
                success_rate_change,
                confidence_change,
                new_tags_found.len(),
            ),
            recommendations: recommendations(
                success_rate_change,
                confidence_change,
                &new_tags_found,
                &improved_tag_counts,
            ),
            new_tags_found,
            improved_tag_counts,
        }
    }
}

/// Success and confidence weigh 0.4 each, new tags 0.2
///
/// Success rate moves the score by 2 per percentage point, confidence by 100
/// per unit; each new tag is worth 10 up to 100.
fn improvement_score(success_rate_change: f64, confidence_change: f64, new_tags: usize) -> f64 {
    let success = (50.0 + success_rate_change * 100.0 * 2.0).clamp(0.0, 100.0);
    let confidence = (50.0 + confidence_change * 100.0).clamp(0.0, 100.0);
    let tags = (new_tags as f64 * 10.0).min(100.0);
    success * 0.4 + confidence * 0.4 + tags * 0.2
}

fn recommendations(
    success_rate_change: f64,
    confidence_change: f64,
    new_tags: &[String],
    improved: &BTreeMap<String, usize>,
) -> Vec<String> {
    let mut out = Vec::new();

    if success_rate_change > 0.05 {
        out.push("Success rate improved; the current prompts are working well".to_string());
    } else if success_rate_change < -0.05 {
        out.push("Success rate dropped; consider reverting the prompt changes".to_string());
    }

    if confidence_change > 0.1 {
        out.push("Confidence scores improved significantly".to_string());
    } else if confidence_change < -0.1 {
        out.push("Confidence scores dropped; review prompt clarity".to_string());
    }

    if new_tags.len() > 10 {
        out.push(format!(
            "Found {} new tags; extraction is more comprehensive",
            new_tags.len()
        ));
    } else if new_tags.is_empty() {
        out.push("No new tags found; consider expanding the extraction prompt".to_string());
    }

    if !improved.is_empty() {
        let mut top: Vec<_> = improved.iter().collect();
        top.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let names: Vec<&str> = top
            .iter()
            .take(3)
            .map(|(tag, _)| tag.split_once(':').map_or(tag.as_str(), |(_, term)| term))
            .collect();
        out.push(format!("Improved extraction for: {}", names.join(", ")));
    }

    if out.is_empty() {
        out.push("Results are similar to the baseline; try A/B testing different prompts".to_string());
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_record() -> RunRecord {
        RunRecord {
            run_id: RunId::new(),
            timestamp: 1_700_000_000,
            total_captions: 10,
            accepted_count: 6,
            rejected_count: 3,
            errored_count: 1,
            cache_hits: 0,
            mode_used: ExecutionMode::Concurrent,
            total_cost_estimate: 0.02,
            success_rate: 0.9,
            model_name: "gpt-4o-mini".to_string(),
            average_confidence: 0.8,
            duration_seconds: 12.0,
            avg_call_latency_ms: 900.0,
            fallback_count: 0,
            cancelled: false,
            prompt_fingerprint: "abc123def456".to_string(),
            details: RunDetails::default(),
        }
    }

    #[test]
    fn test_run_id_roundtrip_string() {
        let id = RunId::new();
        assert_eq!(RunId::from_string(&id.to_string()).unwrap(), id);
        assert!(RunId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(RunRecord::compute_success_rate(0, 0), 1.0);
        assert_eq!(RunRecord::compute_success_rate(4, 1), 0.75);
        assert_eq!(RunRecord::compute_success_rate(3, 3), 0.0);
    }

    #[test]
    fn test_comparison_is_b_minus_a() {
        let a = sample_record();
        let mut b = sample_record();
        b.accepted_count = 4;
        b.success_rate = 1.0;
        b.total_cost_estimate = 0.01;
        b.prompt_fingerprint = "ffffffffffff".to_string();

        let cmp = RunComparison::between(&a, &b);
        assert_eq!(cmp.count_change, -2);
        assert!((cmp.success_rate_change - 0.1).abs() < 1e-9);
        assert!((cmp.cost_change + 0.01).abs() < 1e-9);
        assert!(cmp.prompt_changed);
    }

    fn recipe(proteins: &[&str], confidence: f64) -> ExtractionRecord {
        let mut record = ExtractionRecord::titled("Test");
        record.proteins = proteins.iter().map(|p| p.to_string()).collect();
        record.cooking_method = vec!["bake".to_string()];
        record.confidence_score = confidence;
        record
    }

    #[test]
    fn test_details_collect_tags_and_buckets() {
        let records = [
            recipe(&["chicken"], 0.95),
            recipe(&["chicken", "egg"], 0.7),
            recipe(&[], 0.3),
        ];
        let errors = (0..15).map(|i| format!("c{}: failed", i));

        let details = RunDetails::collect(&records, errors);
        assert_eq!(details.tag_counts["proteins:chicken"], 2);
        assert_eq!(details.tag_counts["proteins:egg"], 1);
        assert_eq!(details.tag_counts["cooking_method:bake"], 3);
        assert_eq!(
            details.confidence_distribution,
            ConfidenceDistribution { high: 1, medium: 1, low: 1 }
        );
        assert_eq!(details.extraction_errors.len(), MAX_RECORDED_ERRORS);
        assert_eq!(details.top_tags(2), vec![("cooking_method:bake", 3), ("proteins:chicken", 2)]);
    }

    #[test]
    fn test_confidence_bucket_edges() {
        let mut dist = ConfidenceDistribution::default();
        for score in [0.8, 0.81, 0.6, 0.61] {
            dist.add(score);
        }
        assert_eq!(dist, ConfidenceDistribution { high: 1, medium: 2, low: 1 });
    }

    #[test]
    fn test_comparison_tag_changes() {
        let mut a = sample_record();
        a.details = RunDetails::collect(&[recipe(&["chicken"], 0.9)], Vec::new());
        let mut b = sample_record();
        b.details = RunDetails::collect(
            &[recipe(&["chicken", "tofu"], 0.9), recipe(&["chicken"], 0.9)],
            Vec::new(),
        );

        let cmp = RunComparison::between(&a, &b);
        assert_eq!(cmp.new_tags_found, vec!["proteins:tofu".to_string()]);
        assert_eq!(cmp.improved_tag_counts["proteins:chicken"], 1);
        assert_eq!(cmp.improved_tag_counts["cooking_method:bake"], 1);
        assert!(cmp
            .recommendations
            .iter()
            .any(|r| r.starts_with("Improved extraction for:") && r.contains("chicken")));
    }

    #[test]
    fn test_improvement_score() {
        let a = sample_record();
        let same = RunComparison::between(&a, &a);
        // No change and no new tags
        assert!((same.improvement_score - 40.0).abs() < 1e-9);
        assert!(same.recommendations.iter().any(|r| r.starts_with("No new tags")));

        let mut better = sample_record();
        better.success_rate = a.success_rate + 0.1;
        better.average_confidence = a.average_confidence + 0.2;
        let cmp = RunComparison::between(&a, &better);
        // success 70, confidence 70, tags 0
        assert!((cmp.improvement_score - 56.0).abs() < 1e-9);
        assert!(cmp.recommendations.iter().any(|r| r.starts_with("Success rate improved")));
        assert!(cmp.recommendations.iter().any(|r| r.starts_with("Confidence scores improved")));

        let mut worse = sample_record();
        worse.success_rate = 0.0;
        let cmp = RunComparison::between(&a, &worse);
        assert!(cmp.improvement_score < 40.0);
        assert!(cmp.recommendations.iter().any(|r| r.starts_with("Success rate dropped")));
    }

    #[test]
    fn test_record_json_flattens_details() {
        let mut record = sample_record();
        record.details = RunDetails::collect(&[recipe(&["beef"], 0.9)], vec!["x".to_string()]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tag_counts"]["proteins:beef"], 1);
        assert_eq!(json["confidence_distribution"]["high"], 1);

        let back: RunRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(ProcessingMode::parse("AUTO"), Some(ProcessingMode::Auto));
        assert!("sequential".parse::<ProcessingMode>().is_err());
        assert_eq!(ExecutionMode::parse("batch"), Some(ExecutionMode::Batch));
    }
}
