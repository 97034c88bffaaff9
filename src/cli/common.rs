//! Arguments and setup shared by several commands.

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use std::path::PathBuf;

use crate::build::BuildRequest;
use crate::config::GlobalConfig;
use crate::constants::{GIT_LOGIN_ENV, GIT_PASSWORD_ENV};
use crate::emitter::{Credentials, EmitOptions};
use crate::locator::SpecLocator;

/// Configuration and search path every command runs against.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Loaded user configuration
    pub config: GlobalConfig,
    /// Specification search path
    pub locator: SpecLocator,
}

impl CommandContext {
    /// Load the configuration and build the search path.
    ///
    /// Non-empty `spec_dirs` replace the whole search path.
    pub async fn load(config_path: Option<PathBuf>, spec_dirs: Vec<PathBuf>) -> Result<Self> {
        let config = GlobalConfig::load_with_optional(config_path).await?;
        let locator = if spec_dirs.is_empty() {
            SpecLocator::from_env(None, &config.resolved_search_paths()?)?
        } else {
            SpecLocator::with_dirs(spec_dirs)
        };
        Ok(Self {
            config,
            locator,
        })
    }
}

/// Output format of `list` and `show`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON document
    Json,
}

/// Emission switches. Each flag given on the command line overrides the
/// configured value.
#[derive(Args, Debug, Clone, Default)]
pub struct EmitArgs {
    /// Do not emit the channel terms-of-service acceptance step
    #[arg(long)]
    pub skip_tos: bool,

    /// One conda install command per channel/solver group
    #[arg(long)]
    pub separate_installs: bool,

    /// Clone remote pip sources on the host and install them from the staging directory
    #[arg(long)]
    pub staging: bool,

    /// Treat the base image as already shipping conda
    #[arg(long)]
    pub conda_preinstalled: bool,

    /// Do not update conda before installing packages
    #[arg(long)]
    pub no_conda_update: bool,

    /// Staging directory name inside the build context
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<String>,
}

impl EmitArgs {
    /// Overlay the flags given on the command line onto `options`.
    pub fn apply_to(&self, options: &mut EmitOptions) {
        options.skip_terms_of_service |= self.skip_tos;
        options.separate_installs_per_channel |= self.separate_installs;
        options.staging_mode |= self.staging;
        options.environment_manager_preinstalled |= self.conda_preinstalled;
        if self.no_conda_update {
            options.update_environment_manager = false;
        }
    }

    /// Build request for `name` in `context_dir`, configured defaults
    /// overridden by these flags.
    pub fn request(
        &self,
        name: &str,
        context_dir: PathBuf,
        config: &GlobalConfig,
        credentials: Option<Credentials>,
    ) -> BuildRequest {
        let mut request = BuildRequest::new(name, context_dir, config);
        self.apply_to(&mut request.options);
        if let Some(dir) = &self.staging_dir {
            request.staging_dir = dir.clone();
        }
        request.credentials = credentials;
        request
    }
}

/// Credentials used when a `PRIVATE_GIT` source is declared.
#[derive(Args, Debug, Clone, Default)]
pub struct CredentialArgs {
    /// Login for private sources
    #[arg(long, env = GIT_LOGIN_ENV)]
    pub login: Option<String>,
}

impl CredentialArgs {
    /// Credentials from `--login` and the password environment variable.
    ///
    /// Both or neither must be set.
    pub fn credentials(&self) -> Result<Option<Credentials>> {
        let password = std::env::var(GIT_PASSWORD_ENV).ok().filter(|p| !p.is_empty());
        match (&self.login, password) {
            (Some(login), Some(password)) => Ok(Some(Credentials {
                login: login.clone(),
                password,
            })),
            (None, None) => Ok(None),
            (Some(_), None) => bail!("--login requires the {GIT_PASSWORD_ENV} environment variable"),
            (None, Some(_)) => bail!("{GIT_PASSWORD_ENV} is set but no login was given (--login or {GIT_LOGIN_ENV})"),
        }
    }
}
