//! Generate the Dockerfile, build the image and clean up.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::common::{CommandContext, CredentialArgs, EmitArgs};
use crate::build::Pipeline;
use crate::container::DockerExporter;
use crate::git::GitFetcher;

/// Command to build an image from a specification.
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Specification name (file name without `.docker_spec`)
    name: String,

    /// Image tag (defaults to `<name>:1.0`)
    #[arg(short, long)]
    tag: Option<String>,

    /// Build context directory
    #[arg(long, value_name = "DIR", default_value = ".")]
    context_dir: PathBuf,

    /// Leave a Dockerfile containing credentials in place instead of wiping it
    #[arg(long)]
    nowipe: bool,

    #[command(flatten)]
    emit: EmitArgs,

    #[command(flatten)]
    credentials: CredentialArgs,
}

impl BuildCommand {
    fn tag(&self) -> String {
        self.tag.clone().unwrap_or_else(|| format!("{}:1.0", self.name))
    }

    /// Run the full build.
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let tag = self.tag();
        let request = self.emit.request(
            &self.name,
            self.context_dir.clone(),
            &ctx.config,
            self.credentials.credentials()?,
        );

        let pipeline = Pipeline::new(&ctx.locator, DockerExporter, GitFetcher);
        pipeline.prepare_image(&request, &tag, self.nowipe).await?;

        println!("{} {}", "Built".green().bold(), tag);
        Ok(())
    }
}
