//! Ricettario CLI library.
//!
//! This library provides the core functionality for the Ricettario command-line interface,
//! including configuration management, command execution, and output formatting.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::{Cli, Command};
pub use config::Config;
pub use error::{CliError, Result};
pub use output::Formatter;

/// Log directives used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVES: &str =
    "warn,ricettario_cli=info,ricettario_extractor=info,ricettario_llm=info,ricettario_store=info";

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::EnvFilter;

    #[test]
    fn test_default_log_directives_name_workspace_crates() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_DIRECTIVES).is_ok());

        let known = ["ricettario_cli", "ricettario_extractor", "ricettario_llm", "ricettario_store"];
        for directive in DEFAULT_LOG_DIRECTIVES.split(',') {
            if let Some((target, _)) = directive.split_once('=') {
                assert!(known.contains(&target), "unknown log target {}", target);
            }
        }
    }
}
