//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use ricettario_domain::{RunComparison, RunRecord, TrendAnalysis};
use ricettario_extractor::{ModePlan, ProgressEvent, RunReport};
use std::time::Duration;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format a mode plan.
    pub fn format_plan(&self, plan: &ModePlan) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
                "recommended_mode": plan.recommended_mode,
                "requested_mode": plan.requested,
                "uncached": plan.uncached,
                "cached": plan.cached,
                "cost_concurrent": plan.cost_concurrent,
                "cost_batch": plan.cost_batch,
                "latency_concurrent_secs": plan.latency_concurrent.as_secs_f64(),
                "latency_batch_secs": plan.latency_batch.as_secs_f64(),
                "savings": plan.savings,
                "savings_percent": plan.savings_percent,
                "reasoning": plan.reasoning,
            }))?),
            OutputFormat::Table => {
                let mut builder = Builder::default();
                builder.push_record(["Mode", "Captions", "Est. cost", "Est. time"]);
                builder.push_record([
                    "concurrent".to_string(),
                    plan.uncached.to_string(),
                    format!("${:.4}", plan.cost_concurrent),
                    format_duration(plan.latency_concurrent),
                ]);
                builder.push_record([
                    "batch".to_string(),
                    plan.uncached.to_string(),
                    format!("${:.4}", plan.cost_batch),
                    format!("up to {}", format_duration(plan.latency_batch)),
                ]);

                let mut out = self.table(builder);
                out.push('\n');
                out.push_str(&format!(
                    "{} cached, {} to process\n",
                    plan.cached, plan.uncached
                ));
                out.push_str(&self.info(&format!(
                    "Selected {} mode: {} (batch saves ${:.4}, {:.0}%)",
                    plan.recommended_mode, plan.reasoning, plan.savings, plan.savings_percent
                )));
                Ok(out)
            }
        }
    }

    /// Format the summary of a finished run.
    pub fn format_report(&self, report: &RunReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
                "record": report.record,
                "outcomes": report.outcomes,
            }))?),
            OutputFormat::Table => {
                let record = &report.record;
                let mut out = self.format_record_detail(record);
                let errors: Vec<_> = report.errors().collect();
                if !errors.is_empty() {
                    out.push('\n');
                    let mut builder = Builder::default();
                    builder.push_record(["Caption", "Error"]);
                    for (id, error) in errors {
                        builder.push_record([id.to_string(), error.to_string()]);
                    }
                    out.push_str(&self.table(builder));
                }
                out.push('\n');
                if record.cancelled {
                    out.push_str(
                        &self.warning("Run was cancelled; unprocessed captions are listed as errors"),
                    );
                } else {
                    out.push_str(&self.success(&format!(
                        "{} recipes from {} captions",
                        record.accepted_count, record.total_captions
                    )));
                }
                Ok(out)
            }
        }
    }

    /// Format a list of run records.
    pub fn format_records(&self, records: &[RunRecord]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
            OutputFormat::Table => {
                if records.is_empty() {
                    return Ok(self.colorize("No runs recorded.", "yellow"));
                }

                let mut builder = Builder::default();
                builder.push_record([
                    "Run", "Mode", "Total", "Recipes", "Rejected", "Errors", "Cached", "Success",
                    "Cost", "Duration",
                ]);
                for record in records {
                    builder.push_record([
                        record.run_id.to_string(),
                        record.mode_used.to_string(),
                        record.total_captions.to_string(),
                        record.accepted_count.to_string(),
                        record.rejected_count.to_string(),
                        record.errored_count.to_string(),
                        record.cache_hits.to_string(),
                        format!("{:.1}%", record.success_rate * 100.0),
                        format!("${:.4}", record.total_cost_estimate),
                        format_duration(Duration::from_secs_f64(record.duration_seconds.max(0.0))),
                    ]);
                }
                Ok(self.table(builder))
            }
        }
    }

    /// Format a comparison between two runs.
    pub fn format_comparison(&self, comparison: &RunComparison) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(comparison)?),
            OutputFormat::Table => {
                let mut builder = Builder::default();
                builder.push_record(["Metric", "Change (B - A)"]);
                builder.push_record([
                    "Success rate".to_string(),
                    format!("{:+.1} pts", comparison.success_rate_change * 100.0),
                ]);
                builder.push_record(["Cost".to_string(), format!("{:+.4} $", comparison.cost_change)]);
                builder.push_record(["Recipes".to_string(), format!("{:+}", comparison.count_change)]);
                builder.push_record([
                    "Avg confidence".to_string(),
                    format!("{:+.3}", comparison.confidence_change),
                ]);
                builder.push_record([
                    "Duration".to_string(),
                    format!("{:+.1} s", comparison.duration_change),
                ]);
                builder.push_record([
                    "Prompts".to_string(),
                    if comparison.prompt_changed { "changed" } else { "same" }.to_string(),
                ]);
                builder.push_record([
                    "New tags".to_string(),
                    comparison.new_tags_found.len().to_string(),
                ]);
                builder.push_record([
                    "Improved tags".to_string(),
                    comparison.improved_tag_counts.len().to_string(),
                ]);
                builder.push_record([
                    "Improvement score".to_string(),
                    format!("{:.1}/100", comparison.improvement_score),
                ]);

                let mut out = format!("A: {}\nB: {}\n", comparison.run_a, comparison.run_b);
                out.push_str(&self.table(builder));
                for recommendation in &comparison.recommendations {
                    out.push('\n');
                    out.push_str(&self.info(recommendation));
                }
                Ok(out)
            }
        }
    }

    /// Format the trend over the last `days` days.
    pub fn format_trend(&self, days: u32, trend: Option<&TrendAnalysis>) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&trend)?),
            OutputFormat::Table => {
                let Some(trend) = trend else {
                    return Ok(self.colorize(&format!("No runs in the last {} days.", days), "yellow"));
                };

                let mut builder = Builder::default();
                builder.push_record(["Metric", "Start", "End", "Change", "Average"]);
                builder.push_record([
                    "Success rate".to_string(),
                    format!("{:.1}%", trend.success_rate.start * 100.0),
                    format!("{:.1}%", trend.success_rate.end * 100.0),
                    format!("{:+.1} pts", trend.success_rate.change * 100.0),
                    format!("{:.1}%", trend.success_rate.average * 100.0),
                ]);
                builder.push_record([
                    "Avg confidence".to_string(),
                    format!("{:.2}", trend.confidence.start),
                    format!("{:.2}", trend.confidence.end),
                    format!("{:+.3}", trend.confidence.change),
                    format!("{:.2}", trend.confidence.average),
                ]);

                let mut out = format!(
                    "{} runs in the last {} days, latest {}\n",
                    trend.total_runs, trend.period_days, trend.most_recent_run
                );
                out.push_str(&self.table(builder));
                out.push('\n');
                out.push_str(&format!(
                    "Cost: ${:.4} total, ${:.4} per run ({})",
                    trend.cost.total,
                    trend.cost.average_per_run,
                    if trend.cost.increasing { "increasing" } else { "stable or falling" }
                ));
                Ok(out)
            }
        }
    }

    /// Format one progress event as a single line.
    pub fn progress(&self, event: &ProgressEvent) -> String {
        let percent = if event.total == 0 {
            100.0
        } else {
            event.completed as f64 / event.total as f64 * 100.0
        };
        format!(
            "{} {}/{} ({:.0}%)",
            self.colorize(&event.description, "cyan"),
            event.completed,
            event.total,
            percent
        )
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    fn format_record_detail(&self, record: &RunRecord) -> String {
        let rows = [
            ("Run", record.run_id.to_string()),
            ("Mode", record.mode_used.to_string()),
            ("Model", record.model_name.clone()),
            ("Captions", record.total_captions.to_string()),
            ("Recipes", record.accepted_count.to_string()),
            ("Not recipes", record.rejected_count.to_string()),
            ("Errors", record.errored_count.to_string()),
            ("From cache", record.cache_hits.to_string()),
            ("Batch fallbacks", record.fallback_count.to_string()),
            ("Success rate", format!("{:.1}%", record.success_rate * 100.0)),
            ("Avg confidence", format!("{:.2}", record.average_confidence)),
            (
                "Confidence (high/medium/low)",
                format!(
                    "{}/{}/{}",
                    record.details.confidence_distribution.high,
                    record.details.confidence_distribution.medium,
                    record.details.confidence_distribution.low
                ),
            ),
            ("Top tags", top_tags(record)),
            ("Est. cost", format!("${:.4}", record.total_cost_estimate)),
            (
                "Duration",
                format_duration(Duration::from_secs_f64(record.duration_seconds.max(0.0))),
            ),
        ];

        let mut builder = Builder::default();
        for (label, value) in rows {
            builder.push_record([label.to_string(), value]);
        }

        let mut table = builder.build();
        table.with(Style::rounded());
        table.to_string()
    }

    fn table(&self, builder: Builder) -> String {
        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            "cyan" => text.cyan().to_string(),
            _ => text.to_string(),
        }
    }
}

fn top_tags(record: &RunRecord) -> String {
    let tags = record.details.top_tags(5);
    if tags.is_empty() {
        return "-".to_string();
    }
    tags.iter()
        .map(|(tag, count)| {
            let term = tag.split_once(':').map_or(*tag, |(_, term)| term);
            format!("{} ({})", term, count)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Human-readable duration, e.g. `45s`, `3m 20s`, `24h 00m`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3_600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3_600, (secs % 3_600) / 60)
    }
}
