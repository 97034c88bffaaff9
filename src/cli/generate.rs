//! Write the Dockerfile for a specification without building it.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::common::{CommandContext, CredentialArgs, EmitArgs};
use crate::build::Pipeline;
use crate::container::DockerExporter;
use crate::git::GitFetcher;

/// Command to generate a Dockerfile.
#[derive(Args, Debug)]
pub struct GenerateCommand {
    /// Specification name (file name without `.docker_spec`)
    name: String,

    /// Directory receiving the Dockerfile and staged files
    #[arg(short = 'o', long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// File name of the generated Dockerfile
    #[arg(long, value_name = "NAME", default_value = crate::constants::DOCKERFILE_NAME)]
    dockerfile: String,

    #[command(flatten)]
    emit: EmitArgs,

    #[command(flatten)]
    credentials: CredentialArgs,
}

impl GenerateCommand {
    /// Resolve, emit and write the Dockerfile.
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let mut request = self.emit.request(
            &self.name,
            self.output_dir.clone(),
            &ctx.config,
            self.credentials.credentials()?,
        );
        request.dockerfile_name = self.dockerfile;

        let pipeline = Pipeline::new(&ctx.locator, DockerExporter, GitFetcher);
        let prepared = pipeline.prepare_dockerfile(&request).await?;

        println!(
            "{} {} ({})",
            "Generated".green().bold(),
            prepared.dockerfile.display(),
            prepared.chain.join(" -> ")
        );
        if prepared.contains_private {
            println!(
                "{} {} contains credentials; remove it securely once the image is built",
                "Warning:".yellow().bold(),
                prepared.dockerfile.display()
            );
        }
        Ok(())
    }
}
