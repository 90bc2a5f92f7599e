//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - window: show the active capacity window
//! - status: show the window and the capacity verdict
//! - watch: run the capacity monitor in the foreground
//! - config: show the resolved configuration

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Accepted `--at` formats, tried in order.
const AT_FORMATS: [&str; 4] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Pacer - capacity-aware dispatch pacing
#[derive(Parser, Debug)]
#[command(name = "pacer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    pub log_stderr: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the capacity window active now (or at --at)
    Window {
        /// Local time to resolve, e.g. 2025-03-14T22:00
        #[arg(long, value_parser = parse_at)]
        at: Option<NaiveDateTime>,
    },

    /// Show the active window and whether dispatch is blocked
    Status {
        /// Local time to evaluate, e.g. 2025-03-14T22:00
        #[arg(long, value_parser = parse_at)]
        at: Option<NaiveDateTime>,
    },

    /// Run the capacity monitor until Ctrl-C, printing every event
    Watch {
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved configuration and any warnings
    Config,
}

/// Parse a local timestamp given on the command line.
pub fn parse_at(value: &str) -> Result<NaiveDateTime, String> {
    AT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .ok_or_else(|| format!("invalid time '{}', expected YYYY-MM-DDTHH:MM[:SS]", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::try_parse_from(["pacer"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(!cli.log_stderr);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["pacer", "-v"]).unwrap();
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["pacer", "-c", "/path/to/pacer.yml"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/pacer.yml")));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pacer", "watch", "--log-stderr", "-v"]).unwrap();
        assert!(cli.log_stderr);
        assert!(cli.verbose);
    }

    #[test]
    fn test_window_command() {
        let cli = Cli::try_parse_from(["pacer", "window"]).unwrap();
        match cli.command {
            Some(Commands::Window { at }) => assert!(at.is_none()),
            _ => panic!("Expected window command"),
        }
    }

    #[test]
    fn test_status_at() {
        let cli = Cli::try_parse_from(["pacer", "status", "--at", "2025-03-14T22:00"]).unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap().and_hms_opt(22, 0, 0).unwrap();
        match cli.command {
            Some(Commands::Status { at }) => assert_eq!(at, Some(expected)),
            _ => panic!("Expected status command"),
        }
    }

    #[test]
    fn test_status_rejects_bad_time() {
        assert!(Cli::try_parse_from(["pacer", "status", "--at", "tonight"]).is_err());
    }

    #[test]
    fn test_watch_json() {
        let cli = Cli::try_parse_from(["pacer", "watch", "--json"]).unwrap();
        match cli.command {
            Some(Commands::Watch { json }) => assert!(json),
            _ => panic!("Expected watch command"),
        }
    }

    #[test]
    fn test_config_command() {
        let cli = Cli::try_parse_from(["pacer", "config"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config)));
    }

    #[test]
    fn test_parse_at_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap().and_hms_opt(9, 30, 15).unwrap();
        assert_eq!(parse_at("2025-03-14T09:30:15"), Ok(expected));
        assert_eq!(parse_at("2025-03-14 09:30:15"), Ok(expected));
        assert_eq!(parse_at("2025-03-14T09:30"), Ok(expected.with_second(0).unwrap()));
        assert!(parse_at("09:30").is_err());
    }

    #[test]
    fn test_help_works() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_version_flag() {
        let result = Cli::try_parse_from(["pacer", "--version"]);
        // Version flag causes early exit with error (expected)
        assert!(result.is_err());
    }
}
