//! Ricettario CLI - Turn recipe captions into structured recipes.

use clap::Parser;
use ricettario_cli::commands;
use ricettario_cli::{Cli, Command, Config, Formatter, DEFAULT_LOG_DIRECTIVES};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout stays clean for tables and JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> ricettario_cli::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    let format = cli
        .format
        .map(Into::into)
        .unwrap_or(config.settings.format);
    let color_enabled = !cli.no_color && config.settings.color;
    let formatter = Formatter::new(format, color_enabled);

    let api_key = cli.api_key.as_deref();

    match cli.command {
        Command::Run(args) => commands::execute_run(args, &config, api_key, &formatter).await?,
        Command::Plan(args) => commands::execute_plan(args, &config, api_key, &formatter).await?,
        Command::History(args) => commands::execute_history(args, &config, &formatter).await?,
    }

    Ok(())
}
