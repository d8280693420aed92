//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use ricettario_domain::ProcessingMode;
use std::path::PathBuf;

/// Ricettario - Turn recipe captions into structured recipes.
#[derive(Debug, Parser)]
#[command(name = "ricettario")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Classify and extract recipes from a captions file
    Run(RunArgs),

    /// Estimate cost and latency without calling the model
    Plan(PlanArgs),

    /// Inspect past runs
    History(HistoryArgs),
}

/// Arguments for the run command.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// JSON file with an array of captions
    #[arg(short, long)]
    pub captions: PathBuf,

    /// Process only the first N captions
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Execution mode
    #[arg(short, long, value_enum, default_value = "auto")]
    pub mode: ModeArg,

    /// Where to write the extracted recipes
    #[arg(short, long, default_value = "analyzed_recipes.json")]
    pub output: PathBuf,

    /// Ignore and do not fill the result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Extract every caption without classifying first
    #[arg(long)]
    pub force_extraction: bool,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the plan command.
#[derive(Debug, Parser)]
pub struct PlanArgs {
    /// JSON file with an array of captions
    #[arg(short, long)]
    pub captions: PathBuf,

    /// Plan for only the first N captions
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Execution mode
    #[arg(short, long, value_enum, default_value = "auto")]
    pub mode: ModeArg,
}

/// Arguments for history inspection.
#[derive(Debug, Parser)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub action: HistoryAction,
}

/// History actions.
#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    /// Show the most recent runs
    Latest {
        /// Number of runs
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Compare run B against baseline run A
    Compare {
        /// Baseline run id
        run_a: String,
        /// Compared run id
        run_b: String,
    },

    /// Show how runs evolved over recent days
    Trend {
        /// Window length in days
        #[arg(short, long, default_value = "30")]
        days: u32,
    },

    /// Write the whole run history to a JSON file
    Export {
        /// Destination file
        output: PathBuf,
    },
}

/// Mode argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ModeArg {
    /// Let the planner choose
    Auto,
    /// Discounted bulk job
    Batch,
    /// Immediate bounded-parallel calls
    Concurrent,
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
        }
    }
}

impl From<ModeArg> for ProcessingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => ProcessingMode::Auto,
            ModeArg::Batch => ProcessingMode::Batch,
            ModeArg::Concurrent => ProcessingMode::Concurrent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_defaults() {
        let cli = Cli::parse_from(["ricettario", "run", "--captions", "captions.json"]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.captions, PathBuf::from("captions.json"));
                assert_eq!(args.output, PathBuf::from("analyzed_recipes.json"));
                assert!(matches!(args.mode, ModeArg::Auto));
                assert!(args.limit.is_none());
                assert!(!args.no_cache);
                assert!(!args.yes);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_command_flags() {
        let cli = Cli::parse_from([
            "ricettario",
            "--format",
            "json",
            "run",
            "-c",
            "in.json",
            "--limit",
            "5",
            "--mode",
            "batch",
            "--no-cache",
            "-y",
        ]);
        assert!(matches!(cli.format, Some(CliFormat::Json)));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.limit, Some(5));
                assert!(matches!(args.mode, ModeArg::Batch));
                assert!(args.no_cache);
                assert!(args.yes);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_history_commands() {
        let cli = Cli::parse_from(["ricettario", "history", "latest", "-n", "3"]);
        match cli.command {
            Command::History(HistoryArgs {
                action: HistoryAction::Latest { count },
            }) => assert_eq!(count, 3),
            _ => panic!("Expected History Latest command"),
        }

        let cli = Cli::parse_from(["ricettario", "history", "compare", "a", "b"]);
        assert!(matches!(
            cli.command,
            Command::History(HistoryArgs {
                action: HistoryAction::Compare { .. }
            })
        ));

        let cli = Cli::parse_from(["ricettario", "history", "trend"]);
        match cli.command {
            Command::History(HistoryArgs {
                action: HistoryAction::Trend { days },
            }) => assert_eq!(days, 30),
            _ => panic!("Expected History Trend command"),
        }

        let cli = Cli::parse_from(["ricettario", "history", "trend", "--days", "7"]);
        assert!(matches!(
            cli.command,
            Command::History(HistoryArgs {
                action: HistoryAction::Trend { days: 7 }
            })
        ));

        let cli = Cli::parse_from(["ricettario", "history", "export", "history.json"]);
        match cli.command {
            Command::History(HistoryArgs {
                action: HistoryAction::Export { output },
            }) => assert_eq!(output, PathBuf::from("history.json")),
            _ => panic!("Expected History Export command"),
        }
    }

    #[test]
    fn test_mode_conversion() {
        let mode: ProcessingMode = ModeArg::Concurrent.into();
        assert_eq!(mode, ProcessingMode::Concurrent);
    }
}
