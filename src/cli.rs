use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "rmflow",
    about = "Flag-driven lifecycle reconciliation for a YARN resource manager node"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "rmflow.toml")]
    pub config: PathBuf,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Output format for pass reports and status
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Plain)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines
    Plain,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one reconciliation pass over a relation snapshot
    Pass {
        /// Snapshot JSON file, `-` for stdin
        #[arg(short, long)]
        relations: PathBuf,
    },

    /// Run a pass for every snapshot line read from stdin
    Serve,

    /// Show persisted flags and host directory
    Status,

    /// Show the latest collaborator command log
    Log {
        /// Show the latest failed log instead
        #[arg(long)]
        failed: bool,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn pass_requires_relations() {
        assert!(Cli::try_parse_from(["rmflow", "pass"]).is_err());
        let cli = Cli::try_parse_from(["rmflow", "-o", "json", "pass", "--relations", "-"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Pass { relations } if relations == PathBuf::from("-")));
    }
}
