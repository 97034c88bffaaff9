//! Command-line interface for dockspec.
//!
//! # Commands
//!
//! - `generate` - Write the Dockerfile (and staged files) for a specification
//! - `build` - Generate, run `docker image build`, then clean up
//! - `list` - List specifications reachable on the search path
//! - `show` - Print the merged dependencies of a specification
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: errors only
//! - `--config` / `-c`: configuration file (also `DOCKSPEC_CONFIG`)
//! - `--spec-dir`: search only the given directories (repeatable)
//!
//! `RUST_LOG` overrides the level chosen by `--verbose` / `--quiet`.
//!
//! # Examples
//!
//! ```bash
//! dockspec generate scientific
//! dockspec build scientific --tag scientific:dev
//! DOCKSPEC_SPECS=~/specs dockspec list
//! dockspec show scientific --format json
//! ```

mod build;
mod common;
mod generate;
mod list;
mod show;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use common::{CommandContext, CredentialArgs, EmitArgs, OutputFormat};

/// Main CLI structure for dockspec.
#[derive(Parser)]
#[command(
    name = "dockspec",
    about = "Generate Dockerfiles from inheritable build specifications",
    version,
    long_about = "dockspec resolves a chain of flag-tagged .docker_spec files into a single \
                  Dockerfile and can drive the container engine to build the image."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "DOCKSPEC_CONFIG")]
    config: Option<PathBuf>,

    /// Search only these specification directories
    #[arg(long = "spec-dir", value_name = "DIR", global = true)]
    spec_dirs: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the Dockerfile for a specification
    Generate(generate::GenerateCommand),

    /// Generate the Dockerfile, build the image and clean up
    Build(build::BuildCommand),

    /// List available specifications
    List(list::ListCommand),

    /// Show the merged dependencies of a specification
    Show(show::ShowCommand),
}

impl Cli {
    /// Initialize logging, load the configuration and run the subcommand.
    pub async fn execute(self) -> Result<()> {
        self.init_logging();
        let ctx = CommandContext::load(self.config.clone(), self.spec_dirs.clone()).await?;

        match self.command {
            Commands::Generate(cmd) => cmd.execute(&ctx).await,
            Commands::Build(cmd) => cmd.execute(&ctx).await,
            Commands::List(cmd) => cmd.execute(&ctx),
            Commands::Show(cmd) => cmd.execute(&ctx),
        }
    }

    fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            let level = self.log_level();
            EnvFilter::new(format!("dockspec={level},process={level}"))
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(self.verbose)
            .try_init();
    }
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
    fn test_log_level() {
        let cli = Cli::parse_from(["dockspec", "-v", "list"]);
        assert_eq!(cli.log_level(), "debug");
        let cli = Cli::parse_from(["dockspec", "list", "--quiet"]);
        assert_eq!(cli.log_level(), "error");
        let cli = Cli::parse_from(["dockspec", "list"]);
        assert_eq!(cli.log_level(), "info");
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["dockspec", "-v", "-q", "list"]).is_err());
    }

    #[test]
    fn test_spec_dir_repeats() {
        let cli = Cli::parse_from(["dockspec", "--spec-dir", "a", "--spec-dir", "b", "list"]);
        assert_eq!(cli.spec_dirs, vec![PathBuf::from("a"), PathBuf::from("b")]);
    }
}
