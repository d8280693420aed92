//! History module - trends and exports over many run records

use crate::{RunId, RunRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Start, end and mean of one metric over a period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricTrend {
    /// Value of the oldest run
    pub start: f64,
    /// Value of the newest run
    pub end: f64,
    /// `end - start`
    pub change: f64,
    /// Mean over the period
    pub average: f64,
}

impl MetricTrend {
    fn over(values: &[f64]) -> Self {
        let start = values.first().copied().unwrap_or(0.0);
        let end = values.last().copied().unwrap_or(0.0);
        let average = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        Self {
            start,
            end,
            change: end - start,
            average,
        }
    }
}

/// Spend over a period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostTrend {
    /// Sum of run cost estimates
    pub total: f64,
    /// Mean cost per run
    pub average_per_run: f64,
    /// Whether the newest run cost more than the oldest
    pub increasing: bool,
}

/// How runs evolved over the last `period_days` days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    /// Length of the window
    pub period_days: u32,
    /// Runs inside the window
    pub total_runs: usize,
    /// Success rate over the window
    pub success_rate: MetricTrend,
    /// Average confidence over the window
    pub confidence: MetricTrend,
    /// Cost over the window
    pub cost: CostTrend,
    /// Newest run in the window
    pub most_recent_run: RunId,
}

impl TrendAnalysis {
    /// Analyze `runs`, given oldest first; `None` when there are no runs
    pub fn from_runs(period_days: u32, runs: &[RunRecord]) -> Option<Self> {
        let newest = runs.last()?;

        let success: Vec<f64> = runs.iter().map(|r| r.success_rate).collect();
        let confidence: Vec<f64> = runs.iter().map(|r| r.average_confidence).collect();
        let costs: Vec<f64> = runs.iter().map(|r| r.total_cost_estimate).collect();
        let total_cost: f64 = costs.iter().sum();

        Some(Self {
            period_days,
            total_runs: runs.len(),
            success_rate: MetricTrend::over(&success),
            confidence: MetricTrend::over(&confidence),
            cost: CostTrend {
                total: total_cost,
                average_per_run: total_cost / runs.len() as f64,
                increasing: costs.len() > 1 && costs[costs.len() - 1] > costs[0],
            },
            most_recent_run: newest.run_id,
        })
    }
}

/// Best values and totals across the whole history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    /// Highest success rate of any run
    pub best_success_rate: f64,
    /// Highest average confidence of any run
    pub best_confidence: f64,
    /// Sum of all cost estimates
    pub total_cost: f64,
    /// Distinct prompt fingerprints seen
    pub unique_prompts: usize,
}

/// Full history dump, oldest run first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryExport {
    /// When the export was taken (seconds since epoch)
    pub export_timestamp: u64,
    /// Number of runs exported
    pub total_runs: usize,
    /// Every run record
    pub runs: Vec<RunRecord>,
    /// Aggregates over `runs`
    pub summary: HistorySummary,
}

impl HistoryExport {
    /// Build an export from every record in the ledger
    pub fn new(runs: Vec<RunRecord>, export_timestamp: u64) -> Self {
        let summary = HistorySummary {
            best_success_rate: runs.iter().map(|r| r.success_rate).fold(0.0, f64::max),
            best_confidence: runs.iter().map(|r| r.average_confidence).fold(0.0, f64::max),
            total_cost: runs.iter().map(|r| r.total_cost_estimate).sum(),
            unique_prompts: runs
                .iter()
                .map(|r| r.prompt_fingerprint.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
        };
        Self {
            export_timestamp,
            total_runs: runs.len(),
            runs,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::tests::sample_record;

    fn runs() -> Vec<RunRecord> {
        let mut a = sample_record();
        a.success_rate = 0.8;
        a.average_confidence = 0.6;
        a.total_cost_estimate = 0.01;

        let mut b = sample_record();
        b.success_rate = 0.9;
        b.average_confidence = 0.7;
        b.total_cost_estimate = 0.02;
        b.prompt_fingerprint = "other".to_string();

        let mut c = sample_record();
        c.success_rate = 1.0;
        c.average_confidence = 0.8;
        c.total_cost_estimate = 0.03;
        vec![a, b, c]
    }

    #[test]
    fn test_trend_over_runs() {
        let runs = runs();
        let trend = TrendAnalysis::from_runs(30, &runs).unwrap();

        assert_eq!(trend.total_runs, 3);
        assert_eq!(trend.most_recent_run, runs[2].run_id);
        assert!((trend.success_rate.change - 0.2).abs() < 1e-9);
        assert!((trend.success_rate.average - 0.9).abs() < 1e-9);
        assert!((trend.confidence.start - 0.6).abs() < 1e-9);
        assert!((trend.cost.total - 0.06).abs() < 1e-9);
        assert!((trend.cost.average_per_run - 0.02).abs() < 1e-9);
        assert!(trend.cost.increasing);
    }

    #[test]
    fn test_trend_single_and_empty() {
        assert!(TrendAnalysis::from_runs(7, &[]).is_none());

        let one = TrendAnalysis::from_runs(7, &runs()[..1]).unwrap();
        assert_eq!(one.success_rate.change, 0.0);
        assert!(!one.cost.increasing);
    }

    #[test]
    fn test_export_summary() {
        let export = HistoryExport::new(runs(), 1_800_000_000);
        assert_eq!(export.total_runs, 3);
        assert_eq!(export.summary.best_success_rate, 1.0);
        assert_eq!(export.summary.best_confidence, 0.8);
        assert_eq!(export.summary.unique_prompts, 2);
        assert!((export.summary.total_cost - 0.06).abs() < 1e-9);

        let empty = HistoryExport::new(Vec::new(), 0);
        assert_eq!(empty.summary.unique_prompts, 0);
        assert_eq!(empty.summary.best_success_rate, 0.0);
    }
}
