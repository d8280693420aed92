//! History command implementation.

use super::open_store;
use crate::cli::{HistoryAction, HistoryArgs};
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use ricettario_domain::{RunId, RunLedger};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

/// Execute the history command.
pub async fn execute_history(args: HistoryArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let store = open_store(config)?;

    match args.action {
        HistoryAction::Latest { count } => {
            let records = store.latest(count)?;
            println!("{}", formatter.format_records(&records)?);
        }
        HistoryAction::Compare { run_a, run_b } => {
            let comparison = store.compare(parse_run_id(&run_a)?, parse_run_id(&run_b)?)?;
            println!("{}", formatter.format_comparison(&comparison)?);
        }
        HistoryAction::Trend { days } => {
            let trend = store.trend(days, now_secs())?;
            println!("{}", formatter.format_trend(days, trend.as_ref())?);
        }
        HistoryAction::Export { output } => {
            let export = store.export(now_secs())?;
            fs::write(&output, serde_json::to_string_pretty(&export)?)?;
            println!(
                "{}",
                formatter.success(&format!(
                    "Exported {} runs to {}",
                    export.total_runs,
                    output.display()
                ))
            );
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

fn parse_run_id(id: &str) -> Result<RunId> {
    RunId::from_string(id.trim()).map_err(|e| CliError::InvalidInput(format!("'{}': {}", id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use ricettario_domain::{ExecutionMode, HistoryExport, RunDetails, RunRecord};
    use ricettario_store::{SqliteStore, StoreError};

    fn record() -> RunRecord {
        RunRecord {
            run_id: RunId::new(),
            timestamp: 1_700_000_000,
            total_captions: 2,
            accepted_count: 1,
            rejected_count: 1,
            errored_count: 0,
            cache_hits: 0,
            mode_used: ExecutionMode::Concurrent,
            total_cost_estimate: 0.001,
            success_rate: 1.0,
            model_name: "gpt-4o-mini".to_string(),
            average_confidence: 0.8,
            duration_seconds: 1.0,
            avg_call_latency_ms: 500.0,
            fallback_count: 0,
            cancelled: false,
            prompt_fingerprint: "fp".to_string(),
            details: RunDetails::default(),
        }
    }

    #[test]
    fn test_parse_run_id() {
        let id = RunId::new();
        assert_eq!(parse_run_id(&format!(" {} ", id)).unwrap(), id);
        assert!(matches!(parse_run_id("not-a-uuid"), Err(CliError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_compare_against_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database = Some(dir.path().join("r.db"));

        let a = record();
        let b = record();
        {
            let store = SqliteStore::new(dir.path().join("r.db")).unwrap();
            store.append(&a).unwrap();
            store.append(&b).unwrap();
        }

        let formatter = Formatter::new(OutputFormat::Json, false);
        let args = HistoryArgs {
            action: HistoryAction::Compare {
                run_a: a.run_id.to_string(),
                run_b: b.run_id.to_string(),
            },
        };
        execute_history(args, &config, &formatter).await.unwrap();

        let unknown = HistoryArgs {
            action: HistoryAction::Compare {
                run_a: a.run_id.to_string(),
                run_b: RunId::new().to_string(),
            },
        };
        assert!(matches!(
            execute_history(unknown, &config, &formatter).await,
            Err(CliError::Store(StoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_export_writes_history_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database = Some(dir.path().join("r.db"));

        let a = record();
        let mut b = record();
        b.success_rate = 0.5;
        {
            let store = SqliteStore::new(dir.path().join("r.db")).unwrap();
            store.append(&a).unwrap();
            store.append(&b).unwrap();
        }

        let output = dir.path().join("history.json");
        let formatter = Formatter::new(OutputFormat::Table, false);
        let args = HistoryArgs {
            action: HistoryAction::Export {
                output: output.clone(),
            },
        };
        execute_history(args, &config, &formatter).await.unwrap();

        let export: HistoryExport =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(export.total_runs, 2);
        assert_eq!(export.runs, vec![a, b]);
        assert_eq!(export.summary.best_success_rate, 1.0);
        assert!(export.export_timestamp > 0);
    }

    #[tokio::test]
    async fn test_trend_with_and_without_recent_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database = Some(dir.path().join("r.db"));
        let formatter = Formatter::new(OutputFormat::Table, false);

        let trend = |days| HistoryArgs {
            action: HistoryAction::Trend { days },
        };
        execute_history(trend(30), &config, &formatter).await.unwrap();

        let mut recent = record();
        recent.timestamp = now_secs();
        {
            let store = SqliteStore::new(dir.path().join("r.db")).unwrap();
            store.append(&record()).unwrap();
            store.append(&recent).unwrap();
            let window = store.trend(7, now_secs()).unwrap().unwrap();
            assert_eq!(window.total_runs, 1);
            assert_eq!(window.most_recent_run, recent.run_id);
        }
        execute_history(trend(7), &config, &formatter).await.unwrap();
    }
}
