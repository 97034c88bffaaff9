//! Builder for external commands with consistent logging and error mapping.
//!
//! Every child process dockspec starts (git, the container engine, the host
//! python) goes through [`ProcessCommand`]. The builder captures output by
//! default, applies an optional timeout and converts a failed exit status into
//! the [`DockspecError`] variant matching the tool.
//!
//! ```rust,no_run
//! use dockspec::utils::process::{ProcessCommand, Tool};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let head = ProcessCommand::new(Tool::Git)
//!     .args(["rev-parse", "HEAD"])
//!     .current_dir("/path/to/repo")
//!     .with_timeout(Some(Duration::from_secs(10)))
//!     .execute_stdout()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::core::DockspecError;

/// External tool a command runs, selecting the program and the error variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    /// `git`; clone failures report the URL
    Git,
    /// The container engine (`docker`)
    Container,
    /// The host python interpreter
    Python,
    /// Any other program, e.g. the secure removal tool
    Program(String),
}

impl Tool {
    /// Executable name.
    pub fn program(&self) -> &str {
        match self {
            Self::Git => "git",
            Self::Container => "docker",
            Self::Python => "python",
            Self::Program(name) => name,
        }
    }
}

/// Fluent builder for a child process.
pub struct ProcessCommand {
    tool: Tool,

    args: Vec<String>,

    /// Working directory; git receives it as `-C <dir>` instead
    current_dir: Option<PathBuf>,

    capture_output: bool,

    env_vars: Vec<(String, String)>,

    /// `None` waits indefinitely
    timeout_duration: Option<Duration>,

    /// Tag prefixed to log lines
    context: Option<String>,

    /// URL reported when a clone fails
    clone_url: Option<String>,
}

impl ProcessCommand {
    /// Create a command for `tool` with output capture and no timeout.
    pub const fn new(tool: Tool) -> Self {
        Self {
            tool,
            args: Vec::new(),
            current_dir: None,
            capture_output: true,
            env_vars: Vec::new(),
            timeout_duration: None,
            context: None,
            clone_url: None,
        }
    }

    /// Run in `dir`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Let the child write to the terminal instead of capturing its output.
    pub const fn inherit_stdio(mut self) -> Self {
        self.capture_output = false;
        self
    }

    /// Set a timeout (None for no timeout)
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Tag log lines with `context`, e.g. the package being processed.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Remember the URL of a clone for error reporting.
    pub fn clone_url(mut self, url: impl Into<String>) -> Self {
        self.clone_url = Some(url.into());
        self
    }

    /// Execute the command and return its output.
    pub async fn execute(self) -> Result<ProcessOutput> {
        let start = std::time::Instant::now();
        let program = self.tool.program().to_string();
        let mut cmd = Command::new(&program);

        let mut full_args = Vec::new();
        match (&self.tool, &self.current_dir) {
            (Tool::Git, Some(dir)) => {
                full_args.push("-C".to_string());
                full_args.push(dir.display().to_string());
            }
            (_, Some(dir)) => {
                cmd.current_dir(dir);
            }
            (_, None) => {}
        }
        full_args.extend(self.args.iter().cloned());
        cmd.args(&full_args);

        let prefix = self.context.as_deref().map(|c| format!("({c}) ")).unwrap_or_default();
        tracing::debug!(
            target: "process",
            "{}Executing command: {} {}",
            prefix,
            program,
            redact(&full_args).join(" ")
        );

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        if self.capture_output {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        }

        let operation = self.operation();
        let output_future = cmd.output();
        let output = match self.timeout_duration {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "process",
                        "{}Command timed out after {} seconds: {} {}",
                        prefix,
                        duration.as_secs(),
                        program,
                        operation
                    );
                    return Err(self.failure(
                        &operation,
                        format!(
                            "Command timed out after {} seconds. This may indicate:\n\
                            - Network connectivity issues\n\
                            - Authentication prompts waiting for input",
                            duration.as_secs()
                        ),
                    )
                    .into());
                }
            },
            None => output_future.await,
        };
        let output = output.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow::Error::from(DockspecError::BinaryNotFound {
                    name: program.clone(),
                    reason: None,
                })
            } else {
                anyhow::Error::from(e)
            }
        })
        .with_context(|| format!("Failed to execute {program} {operation}"))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "process",
                "{}Command failed with exit code: {:?}",
                prefix,
                output.status.code()
            );
            if !stderr.is_empty() {
                tracing::debug!(target: "process", "{}Error: {}", prefix, stderr.trim());
            }
            let message = if stderr.trim().is_empty() { stdout.clone() } else { stderr.clone() };
            return Err(self.failure(&operation, message).into());
        }

        if !stdout.is_empty() {
            tracing::trace!(target: "process", "{}{}", prefix, stdout.trim());
        }
        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::debug!(
                target: "process",
                "{}{} {} took {:.2}s",
                prefix,
                program,
                operation,
                elapsed.as_secs_f64()
            );
        }

        Ok(ProcessOutput {
            stdout,
            stderr,
        })
    }

    /// Execute the command and return only stdout as a trimmed string
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Execute the command and check for success
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }

    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    fn failure(&self, operation: &str, stderr: String) -> DockspecError {
        match &self.tool {
            Tool::Git if operation == "clone" => DockspecError::GitCloneFailed {
                url: self.clone_url.clone().unwrap_or_else(|| "unknown".to_string()),
                reason: stderr,
            },
            Tool::Git => DockspecError::GitCommandError {
                operation: operation.to_string(),
                stderr,
            },
            Tool::Container => DockspecError::ContainerCommandFailed {
                operation: operation.to_string(),
                stderr,
            },
            Tool::Python | Tool::Program(_) => DockspecError::Other {
                message: format!("{} {} failed: {}", self.tool.program(), operation, stderr.trim()),
            },
        }
    }
}

/// Output of a finished command.
pub struct ProcessOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

/// Hide values following credential flags in logged arguments.
fn redact(args: &[String]) -> Vec<String> {
    let mut hide_next = false;
    args.iter()
        .map(|arg| {
            let shown = if hide_next { "***".to_string() } else { arg.clone() };
            hide_next = matches!(arg.as_str(), "--passwd" | "--password");
            shown
        })
        .collect()
}
