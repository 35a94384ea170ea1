//! CLI module for the AOP agent
//!
//! Provides subcommands:
//! - `serve`: run the chat API server (default)
//! - `check`: load a workflow catalog and report what it contains

pub mod check;
pub mod serve;

use clap::{Parser, Subcommand};

/// AOP Agent - customer support chat driven by workflow procedures
#[derive(Parser)]
#[command(name = "aop-agent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the chat API server (default mode)
    Serve,

    /// Validate a workflow catalog file
    Check(check::CheckArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_parses() {
        let cli = Cli::try_parse_from(["aop-agent"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_check_takes_path() {
        let cli = Cli::try_parse_from(["aop-agent", "check", "--path", "aops.toml"]).unwrap();

        match cli.command {
            Some(Command::Check(args)) => {
                assert_eq!(args.path.as_deref().and_then(|p| p.to_str()), Some("aops.toml"))
            }
            _ => panic!("expected check command"),
        }
    }

    #[test]
    fn test_check_path_is_optional() {
        let cli = Cli::try_parse_from(["aop-agent", "check"]).unwrap();

        match cli.command {
            Some(Command::Check(args)) => assert!(args.path.is_none()),
            _ => panic!("expected check command"),
        }
    }
}
