//! Run command implementation.

use super::{build_engine, load_captions};
use crate::cli::RunArgs;
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use ricettario_extractor::{ProgressSink, RunRequest};
use std::fs;
use std::io::{self, Write};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Execute the run command.
pub async fn execute_run(
    args: RunArgs,
    config: &Config,
    api_key: Option<&str>,
    formatter: &Formatter,
) -> Result<()> {
    let captions = load_captions(&args.captions, args.limit)?;
    if captions.is_empty() {
        return Err(CliError::InvalidInput("No captions to process".to_string()));
    }

    let engine = build_engine(config, api_key)?;

    let mut request = RunRequest::new(captions).with_mode(args.mode.into());
    if args.no_cache {
        request = request.without_cache();
    }
    if args.force_extraction {
        request = request.force_extraction();
    }

    let plan = engine.plan(&request)?;
    println!("{}", formatter.format_plan(&plan)?);

    // Confirm before spending money unless --yes is specified
    if !args.yes && plan.uncached > 0 {
        print!("Continue? [y/N] ");
        io::stdout().flush()?;

        let mut response = String::new();
        io::stdin().read_line(&mut response)?;

        if !response.trim().eq_ignore_ascii_case("y") {
            println!("{}", formatter.info("Operation cancelled"));
            return Ok(());
        }
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping run");
                cancel.cancel();
            }
        })
    };

    let (sink, mut events) = ProgressSink::channel();
    let printer = async {
        while let Some(event) = events.recv().await {
            eprintln!("{}", formatter.progress(&event));
        }
    };

    let (report, ()) = tokio::join!(engine.run(request, sink, cancel), printer);
    interrupt.abort();
    let report = report?;

    fs::write(&args.output, serde_json::to_string_pretty(&report.recipes)?)?;
    info!(
        path = %args.output.display(),
        recipes = report.recipes.len(),
        "Wrote recipes"
    );

    println!("{}", formatter.format_report(&report)?);
    println!(
        "{}",
        formatter.info(&format!(
            "Recipes written to {}",
            args.output.display()
        ))
    );

    Ok(())
}
