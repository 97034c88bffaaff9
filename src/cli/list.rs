//! List the specifications reachable on the search path.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::common::{CommandContext, OutputFormat};

/// Command to list available specifications.
#[derive(Args, Debug)]
pub struct ListCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Also print the directories searched
    #[arg(long)]
    dirs: bool,
}

impl ListCommand {
    /// Print the specification names.
    pub fn execute(self, ctx: &CommandContext) -> Result<()> {
        let mut names = ctx.locator.available_specs()?;
        names.sort();

        match self.format {
            OutputFormat::Json => {
                let doc = serde_json::json!({
                    "specifications": names,
                    "search_path": ctx.locator.dirs(),
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            }
            OutputFormat::Text => {
                if self.dirs {
                    println!("{}", "Search path:".bold());
                    for dir in ctx.locator.dirs() {
                        println!("  {}", dir.display());
                    }
                    println!();
                }
                if names.is_empty() {
                    println!("{}", "No specifications found".yellow());
                }
                for name in names {
                    println!("{name}");
                }
            }
        }
        Ok(())
    }
}
