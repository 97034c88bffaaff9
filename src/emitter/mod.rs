//! Build-line emission.
//!
//! [`emit`] turns a merged [`DependencyCollection`] into Dockerfile instructions.
//! Blocks are written in a fixed order, and a block whose dependencies are absent is
//! skipped:
//!
//! 1. `FROM` and the base commands
//! 2. OS packages (`apt-get`)
//! 3. environment setup: login shell, conda bootstrap, `conda update`
//! 4. conda and python version pins
//! 5. `YML` environment file
//! 6. private-source helper
//! 7. conda packages
//! 8. pip packages, then `PIPLAST` packages
//! 9. `PYTHONPATH` modules
//!
//! The commands of one block are chained into a single `RUN` instruction to
//! keep the image layer count low.
//!
//! Emission is pure. Files the instructions refer to (helper script, environment
//! file, staged sources, copied modules) are reported in [`EmitOutput`] for the
//! caller to write under the staging directory.

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use crate::constants::{
    CONDA_INSTALLER_URL, DEFAULT_CONDA_CHANNELS, DEFAULT_PRIVATE_HOST, DEFAULT_STAGING_DIR,
    ENV_EXPORT_FILE, INTERNAL_CONDA_DIR, INTERNAL_EXTRA_MODULES_DIR, INTERNAL_INSTALLATION_DIR,
    INTERNAL_SCRIPT_DIR, INTERNAL_STAGED_SOURCES_DIR, LOGIN_SHELL_DIRECTIVE,
    PRIVATE_INSTALL_SCRIPT, PRIVATE_INSTALL_SCRIPT_SOURCE, RUN_CONTINUATION,
};
use crate::core::DockspecError;
use crate::dependency::{CondaPackage, DependencyCollection, DependencyList, PipPackage};

/// Switches changing what [`emit`] writes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmitOptions {
    /// Do not accept conda channel terms of service
    pub skip_terms_of_service: bool,
    /// One `RUN` instruction per (channel, solver) group instead of one for all
    pub separate_installs_per_channel: bool,
    /// Install remote pip sources from pre-fetched copies
    pub staging_mode: bool,
    /// Assume the base image already ships conda
    pub environment_manager_preinstalled: bool,
    /// Run `conda update` on the base environment
    pub update_environment_manager: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            skip_terms_of_service: false,
            separate_installs_per_channel: false,
            staging_mode: false,
            environment_manager_preinstalled: false,
            update_environment_manager: true,
        }
    }
}

/// Login and password embedded into private pip installs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name
    pub login: String,
    /// Password or token
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything besides the collection that emission depends on.
#[derive(Debug, Clone)]
pub struct EmitContext {
    /// Emission switches
    pub options: EmitOptions,
    /// Instructions inserted right after `FROM`
    pub base_commands: Vec<String>,
    /// Base images that already ship conda
    pub preinstalled_images: Vec<String>,
    /// Credentials for private sources
    pub credentials: Option<Credentials>,
    /// Staging directory, relative to the build context
    pub staging_dir: String,
}

impl Default for EmitContext {
    fn default() -> Self {
        Self {
            options: EmitOptions::default(),
            base_commands: Vec::new(),
            preinstalled_images: Vec::new(),
            credentials: None,
            staging_dir: DEFAULT_STAGING_DIR.to_string(),
        }
    }
}

/// A file the emitted instructions `COPY` from the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Path relative to the staging directory
    pub name: String,
    /// File contents
    pub contents: String,
}

/// Instructions plus the side material the caller must provide.
#[derive(Debug, Clone, Default)]
pub struct EmitOutput {
    /// Dockerfile instructions, one per entry
    pub lines: Vec<String>,
    /// `PYTHONPATH` modules to copy into the staging directory
    pub copy_requirements: Vec<String>,
    /// Files to write into the staging directory
    pub staged_files: Vec<StagedFile>,
    /// Staging directory, when any instruction copies from it
    pub staging_dir: Option<PathBuf>,
    /// Whether credentials are embedded in `lines`
    pub contains_private: bool,
}

impl EmitOutput {
    /// Dockerfile text.
    pub fn dockerfile(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

/// Emit the Dockerfile instructions for `collection`.
pub fn emit(collection: &DependencyCollection, ctx: &EmitContext) -> Result<EmitOutput> {
    let mut emitter = Emitter {
        ctx,
        output: EmitOutput::default(),
        private: collection.contains_private() && !ctx.options.staging_mode,
    };

    emitter.base(collection)?;
    emitter.os_packages(collection);
    emitter.environment_setup(collection)?;
    emitter.version_pins(collection);
    emitter.env_file(collection)?;
    emitter.private_helper();
    emitter.conda_packages(collection.conda_packages());
    emitter.staged_sources(collection);
    emitter.pip_block(collection.pip_packages(), collection);
    emitter.pip_block(collection.pip_last_packages(), collection);
    emitter.path_modules(collection);

    let mut output = emitter.output;
    if !output.staged_files.is_empty()
        || !output.copy_requirements.is_empty()
        || has_staged(collection)
    {
        output.staging_dir = Some(PathBuf::from(&ctx.staging_dir));
    }
    Ok(output)
}

struct Emitter<'a> {
    ctx: &'a EmitContext,
    output: EmitOutput,
    private: bool,
}

impl Emitter<'_> {
    fn push(&mut self, line: impl Into<String>) {
        self.output.lines.push(line.into());
    }

    fn run(&mut self, commands: &[String]) {
        if !commands.is_empty() {
            self.push(format!("RUN {}", commands.join(RUN_CONTINUATION)));
        }
    }

    fn staged(&self, name: &str) -> String {
        format!("{}/{}", self.ctx.staging_dir, name)
    }

    fn base(&mut self, collection: &DependencyCollection) -> Result<()> {
        let base = collection.base()?;
        self.push(format!("FROM {}", base.reference()));
        for command in &self.ctx.base_commands {
            self.output.lines.push(command.clone());
        }
        Ok(())
    }

    fn os_packages(&mut self, collection: &DependencyCollection) {
        let mut packages: Vec<String> =
            collection.os_packages().iter().map(|p| shell_quote(&p.name)).collect();
        if needs_git(collection, &self.ctx.options) && !packages.iter().any(|p| p == "git") {
            tracing::debug!("Adding git to OS packages for remote sources");
            packages.push("git".to_string());
        }
        if packages.is_empty() {
            return;
        }
        self.run(&[
            "apt-get update".to_string(),
            format!("apt-get install -y {}", packages.join(" ")),
        ]);
    }

    fn environment_setup(&mut self, collection: &DependencyCollection) -> Result<()> {
        self.push(LOGIN_SHELL_DIRECTIVE);

        let reference = collection.base()?.reference();
        let preinstalled = self.ctx.options.environment_manager_preinstalled
            || self.ctx.preinstalled_images.iter().any(|image| *image == reference);
        if preinstalled {
            tracing::debug!("Base image {reference} ships conda, skipping bootstrap");
        } else {
            let installer = CONDA_INSTALLER_URL.rsplit('/').next().unwrap_or(CONDA_INSTALLER_URL);
            let internal = format!("{INTERNAL_INSTALLATION_DIR}/{installer}");
            self.push(format!("ADD {CONDA_INSTALLER_URL} {internal}"));
            self.run(&[format!("chmod +x {internal}"), format!("{internal} -b -p {INTERNAL_CONDA_DIR}")]);
            self.push(format!("ENV PATH={INTERNAL_CONDA_DIR}/bin:$PATH"));
        }

        if self.ctx.options.update_environment_manager {
            self.run(&["conda update -y -n base conda".to_string()]);
        }
        Ok(())
    }

    fn version_pins(&mut self, collection: &DependencyCollection) {
        if let Some(pin) = collection.conda_version() {
            self.run(&[format!("conda install -y {}", shell_quote(&format!("conda={}", pin.version)))]);
        }
        if let Some(pin) = collection.python_version() {
            self.run(&[format!("conda install -y {}", shell_quote(&format!("python={}", pin.version)))]);
        }
    }

    fn env_file(&mut self, collection: &DependencyCollection) -> Result<()> {
        if !collection.requests_env_export() {
            return Ok(());
        }
        let mut export = collection
            .env_export()
            .cloned()
            .ok_or_else(|| DockspecError::Other {
                message: "YML is declared but no environment export was attached".to_string(),
            })?;
        let declared: HashSet<String> = collection.declared_package_names().into_iter().collect();
        export.strip_packages(&declared);

        let internal = format!("{INTERNAL_INSTALLATION_DIR}/{ENV_EXPORT_FILE}");
        self.push(format!("COPY {} {internal}", self.staged(ENV_EXPORT_FILE)));
        self.run(&[format!("conda env update -n base -f {internal}")]);
        self.output.staged_files.push(StagedFile {
            name: ENV_EXPORT_FILE.to_string(),
            contents: export.to_text(),
        });
        Ok(())
    }

    fn private_helper(&mut self) {
        if !self.private {
            return;
        }
        self.push(format!(
            "COPY {} {INTERNAL_SCRIPT_DIR}/{PRIVATE_INSTALL_SCRIPT}",
            self.staged(PRIVATE_INSTALL_SCRIPT)
        ));
        self.run(&["pip install pexpect".to_string()]);
        self.output.staged_files.push(StagedFile {
            name: PRIVATE_INSTALL_SCRIPT.to_string(),
            contents: PRIVATE_INSTALL_SCRIPT_SOURCE.to_string(),
        });
    }

    fn conda_packages(&mut self, packages: &DependencyList<CondaPackage>) {
        let mut groups: Vec<((Option<&str>, Option<&str>), Vec<String>)> = Vec::new();
        for package in packages {
            let key = (package.channel.as_deref(), package.solver.as_deref());
            let spec = shell_quote(&package.install_spec());
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, specs)) => specs.push(spec),
                None => groups.push((key, vec![spec])),
            }
        }

        let mut accepted: Vec<String> = Vec::new();
        let mut batch: Vec<String> = Vec::new();
        for ((channel, solver), specs) in groups {
            if !self.ctx.options.skip_terms_of_service {
                let channels: Vec<&str> = match channel {
                    Some(channel) => vec![channel],
                    None => DEFAULT_CONDA_CHANNELS.to_vec(),
                };
                for channel in channels {
                    if !accepted.iter().any(|c| c == channel) {
                        accepted.push(channel.to_string());
                        batch.push(format!(
                            "conda tos accept --override-channels --channel {channel}"
                        ));
                    }
                }
            }

            let mut command = "conda install -y".to_string();
            if let Some(channel) = channel {
                command.push_str(&format!(" -c {channel}"));
            }
            if let Some(solver) = solver {
                command.push_str(&format!(" --solver={solver}"));
            }
            command.push(' ');
            command.push_str(&specs.join(" "));
            batch.push(command);

            if self.ctx.options.separate_installs_per_channel {
                self.run(&batch);
                batch.clear();
            }
        }
        self.run(&batch);
    }

    fn staged_sources(&mut self, collection: &DependencyCollection) {
        if has_staged(collection) {
            self.push(format!("COPY {} {INTERNAL_STAGED_SOURCES_DIR}", self.ctx.staging_dir));
        }
    }

    fn pip_block(&mut self, packages: &DependencyList<PipPackage>, collection: &DependencyCollection) {
        let (plain, special): (Vec<&PipPackage>, Vec<&PipPackage>) =
            packages.iter().partition(|p| p.install_args.is_empty());

        let mut commands = Vec::new();
        if !plain.is_empty() {
            let targets: Vec<String> = plain.iter().map(|p| shell_quote(&p.install_target())).collect();
            commands.push(self.pip_command(&targets, collection));
        }
        for package in special {
            let mut args = vec![shell_quote(&package.install_target())];
            args.extend(package.install_args.iter().map(|a| shell_quote(a)));
            commands.push(self.pip_command(&args, collection));
        }
        self.run(&commands);
    }

    fn pip_command(&mut self, args: &[String], collection: &DependencyCollection) -> String {
        if !self.private {
            return format!("pip install {}", args.join(" "));
        }

        let mut command =
            format!("python {INTERNAL_SCRIPT_DIR}/{PRIVATE_INSTALL_SCRIPT} {}", args.join(" "));
        let hosts: Vec<&str> = if collection.private_sources().is_empty() {
            vec![DEFAULT_PRIVATE_HOST]
        } else {
            collection.private_sources().iter().map(|s| s.name.as_str()).collect()
        };
        for host in hosts {
            command.push_str(&format!(" --host {}", shell_quote(host)));
        }
        if let Some(credentials) = &self.ctx.credentials {
            command.push_str(&format!(
                " --login {} --passwd {}",
                shell_quote(&credentials.login),
                shell_quote(&credentials.password)
            ));
            self.output.contains_private = true;
        }
        command
    }

    fn path_modules(&mut self, collection: &DependencyCollection) {
        let modules = collection.path_modules();
        if modules.is_empty() {
            return;
        }
        for module in modules {
            self.push(format!(
                "COPY {} {INTERNAL_EXTRA_MODULES_DIR}/{}",
                self.staged(&module.name),
                module.name
            ));
            self.output.copy_requirements.push(module.name.clone());
        }
        self.push(format!("ENV PYTHONPATH={INTERNAL_EXTRA_MODULES_DIR}:$PYTHONPATH"));
    }
}

/// Whether `git` must be available in the image.
///
/// Remote pip sources and git-based private entries are fetched inside the image
/// unless they were staged on the host.
fn needs_git(collection: &DependencyCollection, options: &EmitOptions) -> bool {
    if options.staging_mode {
        return false;
    }
    collection
        .pip_packages()
        .iter()
        .chain(collection.pip_last_packages())
        .any(PipPackage::is_remote)
        || collection.private_sources().iter().any(|s| s.is_remote())
}

fn has_staged(collection: &DependencyCollection) -> bool {
    collection
        .pip_packages()
        .iter()
        .chain(collection.pip_last_packages())
        .any(|p| p.staged_path.is_some())
}

/// Single-quote `word` when it contains characters the shell would interpret.
pub fn shell_quote(word: &str) -> String {
    const SPECIAL: &[char] = &[
        ' ', '\t', '<', '>', '!', '*', '?', '[', ']', '(', ')', '{', '}', '|', '&', ';', '$', '\'',
        '"', '`', '\\', '~',
    ];
    if word.is_empty() {
        return "''".to_string();
    }
    if word.contains(SPECIAL) {
        format!("'{}'", word.replace('\'', r"'\''"))
    } else {
        word.to_string()
    }
}
