//! Container engine and host python collaborators.
//!
//! - [`DockerExporter`] exports the conda environment of a base image (`YML`)
//! - [`build_image`] runs `docker image build` on the prepared context
//! - [`module_location`] finds where the host python imports a module from

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::dependency::EnvironmentExporter;
use crate::utils::process::{ProcessCommand, Tool};

/// [`EnvironmentExporter`] running `conda env export` inside the image.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerExporter;

impl EnvironmentExporter for DockerExporter {
    async fn export(&self, image: &str) -> Result<String> {
        ProcessCommand::new(Tool::Container)
            .args(["run", "--rm", image, "conda", "env", "export"])
            .with_context(image)
            .execute_stdout()
            .await
    }
}

/// Build the image `tag` from the Dockerfile in `context_dir`.
///
/// Build output is streamed to the terminal.
pub async fn build_image(tag: &str, context_dir: &Path) -> Result<()> {
    tracing::info!("Building image {tag}");
    ProcessCommand::new(Tool::Container)
        .args(["image", "build", "-t", tag, "."])
        .current_dir(context_dir)
        .inherit_stdio()
        .execute_success()
        .await
        .with_context(|| format!("Failed to build image {tag}"))
}

/// Path of `module` as imported by the host python.
///
/// Packages resolve to their directory, single-file modules to the file.
pub async fn module_location(module: &str) -> Result<PathBuf> {
    let script = format!("import {module}; print({module}.__file__)");
    let file = ProcessCommand::new(Tool::Python)
        .args(["-c", script.as_str()])
        .with_context(module)
        .execute_stdout()
        .await
        .with_context(|| format!("Python module '{module}' is not importable on this host"))?;

    let file = PathBuf::from(file);
    let is_package = file.file_name().is_some_and(|name| name == "__init__.py");
    match (is_package, file.parent()) {
        (true, Some(dir)) => Ok(dir.to_path_buf()),
        _ => Ok(file),
    }
}
