//! Orchestration around the core: from a specification name to a written
//! Dockerfile, and optionally to a built image.
//!
//! [`Pipeline::prepare_dockerfile`] resolves the chain, attaches the base image's
//! environment export when `YML` asks for it, stages remote sources in staging
//! mode, emits the instructions and writes the Dockerfile together with every
//! file it copies from the staging directory.
//!
//! [`Pipeline::prepare_image`] additionally runs the container engine and
//! cleans up afterwards. A Dockerfile carrying credentials is removed with the
//! platform's secure removal tool.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::GlobalConfig;
use crate::constants::DOCKERFILE_NAME;
use crate::container;
use crate::core::DockspecError;
use crate::dependency::{DependencyCollection, EnvExport, EnvironmentExporter};
use crate::emitter::{self, Credentials, EmitContext, EmitOptions, EmitOutput};
use crate::locator::SpecLocator;
use crate::resolver::{Resolution, Resolver};
use crate::staging::{PyprojectInspector, SourceFetcher, Stager};
use crate::utils::fs::{copy_dir, ensure_dir, remove_dir_all, safe_write};
use crate::utils::platform::{command_exists, safe_removal_command};
use crate::utils::process::{ProcessCommand, Tool};

/// Settings of one `generate` or `build` run.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Root specification name
    pub name: String,
    /// Directory receiving the Dockerfile and the staging directory
    pub context_dir: PathBuf,
    /// Dockerfile name inside `context_dir`
    pub dockerfile_name: String,
    /// Staging directory name inside `context_dir`
    pub staging_dir: String,
    /// Emission switches
    pub options: EmitOptions,
    /// Base images treated as shipping conda, besides `containers_wconda.txt`
    pub extra_preinstalled: Vec<String>,
    /// Credentials for private sources
    pub credentials: Option<Credentials>,
}

impl BuildRequest {
    /// Request for `name` built in `context_dir` with configured defaults.
    pub fn new(name: impl Into<String>, context_dir: impl Into<PathBuf>, config: &GlobalConfig) -> Self {
        Self {
            name: name.into(),
            context_dir: context_dir.into(),
            dockerfile_name: DOCKERFILE_NAME.to_string(),
            staging_dir: config.staging_dir().to_string(),
            options: config.emit.clone(),
            extra_preinstalled: config.preinstalled_images.clone(),
            credentials: None,
        }
    }
}

/// Files written by [`Pipeline::prepare_dockerfile`].
#[derive(Debug, Clone)]
pub struct PreparedBuild {
    /// Written Dockerfile
    pub dockerfile: PathBuf,
    /// Staging directory, when anything was staged
    pub staging_dir: Option<PathBuf>,
    /// Whether the Dockerfile embeds credentials
    pub contains_private: bool,
    /// Specifications merged, in visit order
    pub chain: Vec<String>,
}

/// Connects the core to its external collaborators.
pub struct Pipeline<'a, E, F> {
    locator: &'a SpecLocator,
    exporter: E,
    fetcher: F,
}

impl<'a, E: EnvironmentExporter, F: SourceFetcher> Pipeline<'a, E, F> {
    /// Create a pipeline reading specifications through `locator`.
    pub const fn new(locator: &'a SpecLocator, exporter: E, fetcher: F) -> Self {
        Self {
            locator,
            exporter,
            fetcher,
        }
    }

    /// Merged collection for `name`, with the environment export attached when
    /// `YML` is declared.
    pub async fn collect(&self, name: &str) -> Result<Resolution> {
        let mut resolution = Resolver::new(self.locator).resolve(name)?;
        attach_env_export(&mut resolution.collection, &self.exporter).await?;
        Ok(resolution)
    }

    /// Emit the Dockerfile for `request` and write it with its staged files.
    pub async fn prepare_dockerfile(&self, request: &BuildRequest) -> Result<PreparedBuild> {
        let Resolution {
            mut collection,
            chain,
        } = self.collect(&request.name).await?;
        tracing::info!("Resolved {} from {}", request.name, chain.join(", "));

        let staging_path = request.context_dir.join(&request.staging_dir);
        if request.options.staging_mode {
            Stager::new(&staging_path, &self.fetcher, PyprojectInspector)
                .stage(&mut collection)
                .await?;
        }

        let ctx = self.emit_context(request)?;
        let output = emitter::emit(&collection, &ctx)?;

        write_staged_files(&output, &staging_path).await?;
        let dockerfile = request.context_dir.join(&request.dockerfile_name);
        safe_write(&dockerfile, &output.dockerfile())
            .with_context(|| format!("Failed to write {}", dockerfile.display()))?;
        tracing::info!("Wrote {}", dockerfile.display());

        let staging_dir = if output.staging_dir.is_some() || staging_path.exists() {
            Some(staging_path)
        } else {
            None
        };
        Ok(PreparedBuild {
            dockerfile,
            staging_dir,
            contains_private: output.contains_private,
            chain,
        })
    }

    /// Prepare the Dockerfile, build the image `tag` and clean up.
    ///
    /// Cleanup runs whether or not the build succeeded. With `nowipe`, a
    /// Dockerfile carrying credentials is left in place with a warning.
    pub async fn prepare_image(&self, request: &BuildRequest, tag: &str, nowipe: bool) -> Result<()> {
        check_binaries(request, nowipe)?;
        let prepared = self.prepare_dockerfile(request).await?;

        let built = container::build_image(tag, &request.context_dir).await;
        let cleaned = cleanup(&prepared, nowipe).await;
        built?;
        cleaned
    }

    fn emit_context(&self, request: &BuildRequest) -> Result<EmitContext> {
        let mut preinstalled_images = self.locator.preinstalled_images()?;
        for image in &request.extra_preinstalled {
            if !preinstalled_images.contains(image) {
                preinstalled_images.push(image.clone());
            }
        }
        Ok(EmitContext {
            options: request.options.clone(),
            base_commands: self.locator.base_commands()?,
            preinstalled_images,
            credentials: request.credentials.clone(),
            staging_dir: request.staging_dir.clone(),
        })
    }
}

/// Export the base image's environment when the collection declares `YML`.
pub async fn attach_env_export(
    collection: &mut DependencyCollection,
    exporter: &impl EnvironmentExporter,
) -> Result<()> {
    if !collection.requests_env_export() || collection.env_export().is_some() {
        return Ok(());
    }
    let image = collection.base()?.reference();
    let export = EnvExport::from_image(exporter, &image).await?;
    collection.set_env_export(export)
}

/// Fail early when a binary the run depends on is missing.
pub fn check_binaries(request: &BuildRequest, nowipe: bool) -> Result<()> {
    let mut required = vec![(Tool::Container.program().to_string(), None)];
    if request.options.staging_mode {
        required.push((Tool::Git.program().to_string(), None));
    }
    if request.credentials.is_some() && !request.options.staging_mode && !nowipe {
        required.push((
            safe_removal_command().to_string(),
            Some(
                "The Dockerfile will contain your credentials and must be wiped after the \
                 build. Install the tool or pass --nowipe if you accept the risk."
                    .to_string(),
            ),
        ));
    }

    for (name, reason) in required {
        if !command_exists(&name) {
            return Err(DockspecError::BinaryNotFound {
                name,
                reason,
            }
            .into());
        }
    }
    Ok(())
}

async fn write_staged_files(output: &EmitOutput, staging_path: &Path) -> Result<()> {
    if output.staging_dir.is_none() {
        return Ok(());
    }
    ensure_dir(staging_path)?;

    for file in &output.staged_files {
        safe_write(&staging_path.join(&file.name), &file.contents)?;
    }

    for module in &output.copy_requirements {
        let source = container::module_location(module).await?;
        let target = staging_path.join(module);
        if source.is_dir() {
            copy_dir(&source, &target)?;
        } else {
            // A single-file module becomes a package of the same name
            ensure_dir(&target)?;
            std::fs::copy(&source, target.join("__init__.py")).with_context(|| {
                format!("Failed to copy module {} from {}", module, source.display())
            })?;
        }
        tracing::debug!("Staged module {} from {}", module, source.display());
    }
    Ok(())
}

/// Remove the Dockerfile and the staging directory after a build.
pub async fn cleanup(prepared: &PreparedBuild, nowipe: bool) -> Result<()> {
    tracing::info!("Cleaning up");
    if prepared.contains_private {
        if nowipe {
            tracing::warn!(
                "{} contains credentials but was not wiped",
                prepared.dockerfile.display()
            );
        } else {
            ProcessCommand::new(Tool::Program(safe_removal_command().to_string()))
                .arg(prepared.dockerfile.display().to_string())
                .inherit_stdio()
                .execute_success()
                .await
                .with_context(|| format!("Failed to wipe {}", prepared.dockerfile.display()))?;
        }
    } else if prepared.dockerfile.exists() {
        std::fs::remove_file(&prepared.dockerfile)
            .with_context(|| format!("Failed to remove {}", prepared.dockerfile.display()))?;
    }

    if let Some(dir) = &prepared.staging_dir {
        remove_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct NoExport;

    impl EnvironmentExporter for NoExport {
        async fn export(&self, image: &str) -> Result<String> {
            Ok(format!("name: base\n# exported from {image}\ndependencies:\n  - zlib=1.2.13=h5eee18b_0"))
        }
    }

    struct NoFetch;

    impl SourceFetcher for NoFetch {
        async fn fetch(&self, url: &str, _branch: Option<&str>, _dest: &Path) -> Result<()> {
            anyhow::bail!("unexpected fetch of {url}")
        }
    }

    fn workspace(specs: &[(&str, &str)]) -> (TempDir, SpecLocator) {
        let dir = TempDir::new().unwrap();
        let spec_dir = dir.path().join("specs");
        std::fs::create_dir_all(&spec_dir).unwrap();
        for (name, content) in specs {
            std::fs::write(spec_dir.join(format!("{name}.docker_spec")), content).unwrap();
        }
        (dir, SpecLocator::with_dirs(vec![spec_dir]))
    }

    #[tokio::test]
    async fn test_prepare_dockerfile_writes_files() {
        let (dir, locator) = workspace(&[(
            "env",
            "FROM continuumio/miniconda3:latest\nYML\nPRIVATE_GIT\nPIP tqdm\n",
        )]);
        let context = dir.path().join("ctx");
        let mut request = BuildRequest::new("env", &context, &GlobalConfig::default());
        request.credentials = Some(Credentials {
            login: "me".to_string(),
            password: "pw".to_string(),
        });

        let pipeline = Pipeline::new(&locator, NoExport, NoFetch);
        let prepared = pipeline.prepare_dockerfile(&request).await.unwrap();

        assert!(prepared.contains_private);
        assert_eq!(prepared.chain, vec!["env"]);
        let dockerfile = std::fs::read_to_string(&prepared.dockerfile).unwrap();
        assert!(dockerfile.starts_with("FROM continuumio/miniconda3:latest\n"));
        assert!(dockerfile.contains("--login me --passwd pw"));

        let staging = prepared.staging_dir.clone().unwrap();
        assert!(std::fs::read_to_string(staging.join("base.yml")).unwrap().contains("zlib"));
        assert!(staging.join("private_pip_install.py").is_file());

        cleanup(
            &PreparedBuild {
                contains_private: false,
                ..prepared
            },
            false,
        )
        .await
        .unwrap();
        assert!(!context.join("Dockerfile").exists());
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_collect_without_yml_skips_export() {
        struct PanickingExporter;
        impl EnvironmentExporter for PanickingExporter {
            async fn export(&self, _image: &str) -> Result<String> {
                panic!("export must not run");
            }
        }

        let (_dir, locator) = workspace(&[("plain", "FROM ubuntu:22.04\n")]);
        let resolution =
            Pipeline::new(&locator, PanickingExporter, NoFetch).collect("plain").await.unwrap();
        assert!(resolution.collection.env_export().is_none());
    }

    #[tokio::test]
    async fn test_nowipe_keeps_private_dockerfile() {
        let dir = TempDir::new().unwrap();
        let dockerfile = dir.path().join("Dockerfile");
        std::fs::write(&dockerfile, "FROM ubuntu:22.04\n").unwrap();
        let prepared = PreparedBuild {
            dockerfile: dockerfile.clone(),
            staging_dir: None,
            contains_private: true,
            chain: vec![],
        };
        cleanup(&prepared, true).await.unwrap();
        assert!(dockerfile.exists());
    }
}
