//! Print the merged dependencies of a specification.
//!
//! Resolution only: no image is inspected, so a `YML` flag is reported as
//! present without its export.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::common::{CommandContext, OutputFormat};
use crate::dependency::{DependencyCollection, Flag, PipPackage};
use crate::resolver::Resolver;

/// Command to show a resolved specification.
#[derive(Args, Debug)]
pub struct ShowCommand {
    /// Specification name (file name without `.docker_spec`)
    name: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl ShowCommand {
    /// Resolve and print.
    pub fn execute(self, ctx: &CommandContext) -> Result<()> {
        let resolution = Resolver::new(&ctx.locator).resolve(&self.name)?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolution)?),
            OutputFormat::Text => {
                println!("{} {}", self.name.bold(), format!("({})", resolution.chain.join(" -> ")).dimmed());
                for (flag, entries) in render(&resolution.collection) {
                    if entries.is_empty() {
                        println!("  {}", flag.keyword().cyan());
                    } else {
                        println!("  {} {}", flag.keyword().cyan(), entries.join(" "));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Present flags with their merged entries, in emission order.
fn render(collection: &DependencyCollection) -> Vec<(Flag, Vec<String>)> {
    collection
        .flags()
        .map(|flag| {
            let entries = match flag {
                Flag::From => collection.base().map(|b| vec![b.reference()]).unwrap_or_default(),
                Flag::Apt => collection.os_packages().iter().map(|p| p.name.clone()).collect(),
                Flag::CondaVersion => {
                    collection.conda_version().map(|p| vec![p.version.clone()]).unwrap_or_default()
                }
                Flag::PythonVersion => {
                    collection.python_version().map(|p| vec![p.version.clone()]).unwrap_or_default()
                }
                Flag::Yml => Vec::new(),
                Flag::PrivateGit => {
                    collection.private_sources().iter().map(|s| s.name.clone()).collect()
                }
                Flag::Conda => collection
                    .conda_packages()
                    .iter()
                    .map(|p| {
                        let mut entry = p.install_spec();
                        if let Some(channel) = &p.channel {
                            entry.push_str(&format!("[{channel}]"));
                        }
                        if let Some(solver) = &p.solver {
                            entry.push_str(&format!("({solver})"));
                        }
                        entry
                    })
                    .collect(),
                Flag::Pip => collection.pip_packages().iter().map(pip_entry).collect(),
                Flag::PipLast => collection.pip_last_packages().iter().map(pip_entry).collect(),
                Flag::PythonPath => collection.path_modules().iter().map(|m| m.name.clone()).collect(),
            };
            (flag, entries)
        })
        .collect()
}

fn pip_entry(package: &PipPackage) -> String {
    let mut entry = package.install_target();
    for arg in &package.install_args {
        entry.push(';');
        entry.push_str(arg);
    }
    entry
}
