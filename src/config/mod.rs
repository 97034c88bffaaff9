//! User-wide configuration.
//!
//! Read from `~/.dockspec/config.toml`, or from the file named by the
//! `DOCKSPEC_CONFIG` environment variable or the `--config` flag. A missing file
//! yields the defaults.
//!
//! ```toml
//! # Searched after DOCKSPEC_SPECS, before the bundled specifications
//! search_paths = ["~/docker_specs", "$TEAM_ROOT/specs"]
//!
//! # Base images that already ship conda, in addition to containers_wconda.txt
//! preinstalled_images = ["mambaorg/micromamba:1.5"]
//!
//! staging_dir = "dockspec_staging"
//!
//! [emit]
//! skip_terms_of_service = false
//! separate_installs_per_channel = false
//! staging_mode = false
//! environment_manager_preinstalled = false
//! update_environment_manager = true
//! ```
//!
//! Command-line flags override every value.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::constants::DEFAULT_STAGING_DIR;
use crate::core::DockspecError;
use crate::emitter::EmitOptions;
use crate::utils::platform::resolve_path;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "DOCKSPEC_CONFIG";

/// Contents of the user configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Extra specification directories, `~` and `$VAR` expanded
    #[serde(default)]
    pub search_paths: Vec<String>,

    /// Base images treated as shipping conda
    #[serde(default)]
    pub preinstalled_images: Vec<String>,

    /// Staging directory name under the build context
    #[serde(default)]
    pub staging_dir: Option<String>,

    /// Emission defaults
    #[serde(default)]
    pub emit: EmitOptions,
}

impl GlobalConfig {
    /// Load from `path`, or from [`Self::default_path`] when `None`.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load from `path`.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content).map_err(|e| {
            DockspecError::ConfigError {
                message: format!("{}: {}", path.display(), e.message()),
            }
            .into()
        })
    }

    /// `DOCKSPEC_CONFIG` when set, else `~/.dockspec/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
            .join(".dockspec")
            .join("config.toml"))
    }

    /// Expanded `search_paths`.
    pub fn resolved_search_paths(&self) -> Result<Vec<PathBuf>> {
        self.search_paths
            .iter()
            .map(|p| resolve_path(p).with_context(|| format!("Invalid search path '{p}' in config")))
            .collect()
    }

    /// Configured staging directory name, or the default.
    pub fn staging_dir(&self) -> &str {
        self.staging_dir.as_deref().unwrap_or(DEFAULT_STAGING_DIR)
    }
}
