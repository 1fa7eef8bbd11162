//! CLI command definitions for the `bedside` binary.

pub mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Real-time practice sessions with a simulated patient.
#[derive(Parser)]
#[command(name = "bedside", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Suppress all output except warnings and errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Path to config.toml (default: $BEDSIDE_CONFIG or ~/.bedside/config.toml).
    #[arg(long, global = true, env = "BEDSIDE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST and WebSocket server.
    Serve {
        /// Port to listen on (overrides [server].port).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides [server].host).
        #[arg(long)]
        host: Option<String>,
    },

    /// Print the effective configuration as TOML.
    Config,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_with_overrides() {
        let cli = Cli::parse_from(["bedside", "-vv", "--log-json", "serve", "--port", "9000"]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.log_json);
        match cli.command {
            Commands::Serve { port, host } => {
                assert_eq!(port, Some(9000));
                assert!(host.is_none());
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["bedside", "config", "--config", "/tmp/b.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/b.toml")));
        assert!(matches!(cli.command, Commands::Config));
    }
}
