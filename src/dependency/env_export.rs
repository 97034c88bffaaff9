//! Conda environment export captured from the base image (`YML`).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::Mergeable;
use crate::core::DockspecError;

/// Source of an exported conda environment for a base image.
///
/// The production implementation runs the image through the container engine;
/// tests substitute canned output.
#[allow(async_fn_in_trait)]
pub trait EnvironmentExporter {
    /// Return the `conda env export` text of the environment inside `image`.
    async fn export(&self, image: &str) -> Result<String>;
}

/// Fields an export must carry to be usable with `conda env update`.
#[derive(Deserialize)]
struct EnvironmentFile {
    dependencies: Vec<serde_yaml::Value>,
}

/// Ordered lines of an exported environment file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvExport {
    /// Raw lines, in export order
    pub lines: Vec<String>,
}

impl EnvExport {
    /// Split exported text into lines.
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Export the environment of `image` through `exporter`.
    ///
    /// The export must be a YAML document with a `dependencies` list.
    pub async fn from_image(exporter: &impl EnvironmentExporter, image: &str) -> Result<Self> {
        tracing::info!("Exporting conda environment of {image}");
        let text = exporter.export(image).await?;
        let parsed: EnvironmentFile =
            serde_yaml::from_str(&text).map_err(|e| DockspecError::Other {
                message: format!("Environment export of {image} is not a conda environment file: {e}"),
            })?;
        tracing::debug!("Export of {image} lists {} dependencies", parsed.dependencies.len());
        Ok(Self::from_text(&text))
    }

    /// Delete every `- <name>[=...]` line whose package name is in `names`.
    ///
    /// Covers both conda entries (`- numpy=1.26.4=py311_0`) and the nested pip
    /// section (`- requests==2.31.0`).
    pub fn strip_packages(&mut self, names: &HashSet<String>) {
        let before = self.lines.len();
        self.lines.retain(|line| {
            let mut tokens = line.split_whitespace();
            let (Some("-"), Some(entry)) = (tokens.next(), tokens.next()) else {
                return true;
            };
            let package = entry.split('=').next().unwrap_or(entry);
            !names.contains(package)
        });
        tracing::debug!("Stripped {} lines from environment export", before - self.lines.len());
    }

    /// Text of the environment file.
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

impl Mergeable for EnvExport {
    fn identity(&self) -> &str {
        ""
    }

    fn merge(&mut self, _other: Self) -> Result<()> {
        Err(DockspecError::DuplicateEnvExport.into())
    }
}
