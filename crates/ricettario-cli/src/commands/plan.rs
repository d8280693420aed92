//! Plan command implementation.

use super::{build_engine, load_captions};
use crate::cli::PlanArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::Formatter;
use ricettario_extractor::RunRequest;

/// Execute the plan command.
///
/// Looks up the cache and the latency history but makes no completion calls.
pub async fn execute_plan(
    args: PlanArgs,
    config: &Config,
    api_key: Option<&str>,
    formatter: &Formatter,
) -> Result<()> {
    let captions = load_captions(&args.captions, args.limit)?;
    let engine = build_engine(config, api_key)?;

    let request = RunRequest::new(captions).with_mode(args.mode.into());
    let plan = engine.plan(&request)?;

    println!("{}", formatter.format_plan(&plan)?);
    Ok(())
}
