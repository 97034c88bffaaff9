//! Error handling for dockspec
//!
//! This module provides the error types and user-friendly error reporting for
//! dockspec. The error system is designed around two core principles:
//! 1. **Strongly-typed errors** for precise error handling in code
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`DockspecError`] - Enumerated error types for all failure cases
//! - [`ErrorContext`] - Wrapper that adds user-friendly details and suggestions
//!
//! # Error Categories
//!
//! - **Configuration**: [`DockspecError::MissingBaseImage`], [`DockspecError::UnknownFlag`],
//!   [`DockspecError::DuplicateBaseImage`], [`DockspecError::BinaryNotFound`]
//! - **Merge consistency**: [`DockspecError::UrlMismatch`], [`DockspecError::BranchMismatch`],
//!   [`DockspecError::DuplicateEnvExport`]
//! - **External operations**: [`DockspecError::CloneExhausted`], [`DockspecError::SpecNotFound`],
//!   [`DockspecError::ContainerCommandFailed`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use dockspec::core::{DockspecError, user_friendly_error};
//!
//! let error = anyhow::Error::from(DockspecError::MissingBaseImage);
//! let ctx = user_friendly_error(error);
//! ctx.display(); // Shows colored error with suggestions
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for dockspec operations
///
/// Every failure of the resolution and emission pipeline is fatal; variants carry
/// enough context (file, flag, package, URL) to name the offending input.
#[derive(Error, Debug)]
pub enum DockspecError {
    /// A specification or aggregation file could not be found on the search path
    #[error("File not found: {name}")]
    SpecNotFound {
        /// File name that was looked up
        name: String,
        /// Directories that were searched, in order
        searched: Vec<String>,
    },

    /// A specification line starts with an unrecognized flag
    #[error("Dependency flag not found: {flag} (in {file})")]
    UnknownFlag {
        /// The offending flag token
        flag: String,
        /// Specification file containing the flag
        file: String,
    },

    /// The merged dependency chain declares no base image
    #[error("Need a base image: no FROM declaration found in the specification chain")]
    MissingBaseImage,

    /// Two base images were declared in the chain
    #[error("Multiple FROM statements encountered: '{existing}' and '{duplicate}'")]
    DuplicateBaseImage {
        /// Base image merged first
        existing: String,
        /// Base image that triggered the conflict
        duplicate: String,
    },

    /// A dependency token could not be parsed
    #[error("Invalid dependency specification '{token}': {reason}")]
    InvalidDependency {
        /// Raw token from the specification
        token: String,
        /// Why the token was rejected
        reason: String,
    },

    /// Two declarations of the same package point at different repositories
    #[error("Package URLs do not match for {package}: '{existing}' vs '{other}'")]
    UrlMismatch {
        /// Package identity
        package: String,
        /// URL already merged
        existing: String,
        /// Conflicting URL
        other: String,
    },

    /// Two declarations of the same package request different branches
    #[error("Repo branches do not match for {package}: '{existing}' vs '{other}'")]
    BranchMismatch {
        /// Package identity
        package: String,
        /// Branch already merged
        existing: String,
        /// Conflicting branch
        other: String,
    },

    /// The same repository was staged twice at different branches
    #[error("Repository {url} requested at branches '{existing}' and '{other}'")]
    StagedBranchMismatch {
        /// Normalized repository URL
        url: String,
        /// Branch staged first
        existing: String,
        /// Conflicting branch
        other: String,
    },

    /// More than one environment export was merged
    #[error("Multiple environment exports (YML) encountered")]
    DuplicateEnvExport,

    /// A required external binary is missing
    #[error("Command not found: {name}")]
    BinaryNotFound {
        /// Binary that was looked up on PATH
        name: String,
        /// Optional explanation of why the binary is required
        reason: Option<String>,
    },

    /// Git operation failed during execution
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git operation that failed (e.g., "clone")
        operation: String,
        /// The error output from the git command
        stderr: String,
    },

    /// A single clone attempt failed
    #[error("Failed to clone repository: {url}")]
    GitCloneFailed {
        /// The repository URL that failed to clone
        url: String,
        /// The reason for the clone failure
        reason: String,
    },

    /// Every URL variant of a repository failed to clone
    #[error(
        "Failed to clone {url}{}; check that you have access rights to the repository",
        also_tried(.alternative)
    )]
    CloneExhausted {
        /// URL as declared
        url: String,
        /// Alternate URL form tried after it, when the host has one
        alternative: Option<String>,
    },

    /// A container engine invocation failed
    #[error("Container engine operation failed: {operation}")]
    ContainerCommandFailed {
        /// Operation that failed (e.g., "image build")
        operation: String,
        /// Error output of the engine
        stderr: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML document editing error
    #[error("TOML document error: {0}")]
    TomlEditError(#[from] toml_edit::TomlError),

    /// Other error
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

fn also_tried(alternative: &Option<String>) -> String {
    alternative.as_ref().map(|alt| format!(" (also tried {alt})")).unwrap_or_default()
}

impl Clone for DockspecError {
    fn clone(&self) -> Self {
        match self {
            Self::SpecNotFound {
                name,
                searched,
            } => Self::SpecNotFound {
                name: name.clone(),
                searched: searched.clone(),
            },
            Self::UnknownFlag {
                flag,
                file,
            } => Self::UnknownFlag {
                flag: flag.clone(),
                file: file.clone(),
            },
            Self::MissingBaseImage => Self::MissingBaseImage,
            Self::DuplicateBaseImage {
                existing,
                duplicate,
            } => Self::DuplicateBaseImage {
                existing: existing.clone(),
                duplicate: duplicate.clone(),
            },
            Self::InvalidDependency {
                token,
                reason,
            } => Self::InvalidDependency {
                token: token.clone(),
                reason: reason.clone(),
            },
            Self::UrlMismatch {
                package,
                existing,
                other,
            } => Self::UrlMismatch {
                package: package.clone(),
                existing: existing.clone(),
                other: other.clone(),
            },
            Self::BranchMismatch {
                package,
                existing,
                other,
            } => Self::BranchMismatch {
                package: package.clone(),
                existing: existing.clone(),
                other: other.clone(),
            },
            Self::StagedBranchMismatch {
                url,
                existing,
                other,
            } => Self::StagedBranchMismatch {
                url: url.clone(),
                existing: existing.clone(),
                other: other.clone(),
            },
            Self::DuplicateEnvExport => Self::DuplicateEnvExport,
            Self::BinaryNotFound {
                name,
                reason,
            } => Self::BinaryNotFound {
                name: name.clone(),
                reason: reason.clone(),
            },
            Self::GitCommandError {
                operation,
                stderr,
            } => Self::GitCommandError {
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::GitCloneFailed {
                url,
                reason,
            } => Self::GitCloneFailed {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::CloneExhausted {
                url,
                alternative,
            } => Self::CloneExhausted {
                url: url.clone(),
                alternative: alternative.clone(),
            },
            Self::ContainerCommandFailed {
                operation,
                stderr,
            } => Self::ContainerCommandFailed {
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            // Source errors are not Clone; keep their rendered message
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::TomlError(e) => Self::Other {
                message: format!("TOML parsing error: {e}"),
            },
            Self::TomlEditError(e) => Self::Other {
                message: format!("TOML document error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// Pairs a [`DockspecError`] with optional details (what happened) and a
/// suggestion (what to do about it) for display in the terminal.
///
/// ```rust,no_run
/// use dockspec::core::{DockspecError, ErrorContext};
///
/// let context = ErrorContext::new(DockspecError::MissingBaseImage)
///     .with_suggestion("Add a 'FROM <image>:<tag>' line to the specification")
///     .with_details("Every specification chain needs exactly one base image");
///
/// println!("{}", context);
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: DockspecError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from a [`DockspecError`]
    #[must_use]
    pub const fn new(error: DockspecError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// Recognizes [`DockspecError`] (also when wrapped in anyhow context),
/// [`std::io::Error`] and [`toml::de::Error`]; anything else keeps its full
/// cause chain in the message.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(dockspec_error) = error.chain().find_map(|e| e.downcast_ref::<DockspecError>()) {
        let mut ctx = create_error_context(dockspec_error.clone());
        // Keep the outer context messages visible
        let outer: Vec<String> = error
            .chain()
            .take_while(|e| e.downcast_ref::<DockspecError>().is_none())
            .map(std::string::ToString::to_string)
            .collect();
        if !outer.is_empty() && ctx.details.is_none() {
            ctx.details = Some(outer.join(": "));
        }
        return ctx;
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(DockspecError::Other {
                    message: format!("Permission denied: {io_error}"),
                })
                .with_suggestion("Check file ownership of the working directory and the specification directories");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(DockspecError::Other {
                    message: format!("File not found: {io_error}"),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(DockspecError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax in your dockspec config file");
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(DockspecError::Other {
        message,
    })
}

/// Map each [`DockspecError`] variant to an [`ErrorContext`] with suggestions
fn create_error_context(error: DockspecError) -> ErrorContext {
    match &error {
        DockspecError::SpecNotFound {
            searched,
            ..
        } => {
            let details = format!("Searched: {}", searched.join(", "));
            ErrorContext::new(error)
                .with_details(details)
                .with_suggestion(
                    "Check the specification name, or add its directory to DOCKSPEC_SPECS (colon-separated)",
                )
        }
        DockspecError::UnknownFlag {
            flag,
            ..
        } => {
            let suggestion = match crate::dependency::Flag::closest(flag) {
                Some(known) => format!("Did you mean '{known}'?"),
                None => format!(
                    "Recognized flags: {}, {}",
                    crate::constants::PARENT_FLAG,
                    crate::dependency::Flag::ALL
                        .iter()
                        .map(|f| f.keyword())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            };
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        DockspecError::MissingBaseImage => ErrorContext::new(error)
            .with_suggestion("Add a 'FROM <image>:<tag>' line to the specification or one of its parents"),
        DockspecError::DuplicateBaseImage {
            ..
        } => ErrorContext::new(error)
            .with_details("Exactly one FROM declaration is allowed across the whole PARENT chain")
            .with_suggestion("Remove the FROM line from all but one specification in the chain"),
        DockspecError::UrlMismatch {
            ..
        }
        | DockspecError::BranchMismatch {
            ..
        }
        | DockspecError::StagedBranchMismatch {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Declare the package with the same repository URL and branch everywhere in the chain",
        ),
        DockspecError::BinaryNotFound {
            reason,
            ..
        } => {
            let details = reason.clone();
            let ctx = ErrorContext::new(error)
                .with_suggestion("Install the missing command and make sure it is on your PATH");
            match details {
                Some(details) => ctx.with_details(details),
                None => ctx,
            }
        }
        DockspecError::CloneExhausted {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Make sure your git credentials (SSH key or HTTPS token) can read the repository",
        ),
        DockspecError::GitCloneFailed {
            reason,
            ..
        }
        | DockspecError::GitCommandError {
            stderr: reason,
            ..
        } => {
            let details = reason.clone();
            ErrorContext::new(error).with_details(details)
        }
        DockspecError::ContainerCommandFailed {
            stderr,
            ..
        } => {
            let details = stderr.clone();
            ErrorContext::new(error)
                .with_details(details)
                .with_suggestion("Check that the docker daemon is running and you may talk to it")
        }
        _ => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_context_display() {
        let ctx = ErrorContext::new(DockspecError::MissingBaseImage)
            .with_details("details here")
            .with_suggestion("do this");
        let rendered = ctx.to_string();
        assert!(rendered.contains("Need a base image"));
        assert!(rendered.contains("Details: details here"));
        assert!(rendered.contains("Suggestion: do this"));
    }

    #[test]
    fn test_user_friendly_error_unknown_flag_suggests_closest() {
        let error = anyhow::Error::from(DockspecError::UnknownFlag {
            flag: "CODNA".to_string(),
            file: "x.docker_spec".to_string(),
        });
        let ctx = user_friendly_error(error);
        assert!(matches!(ctx.error, DockspecError::UnknownFlag { .. }));
        assert!(ctx.suggestion.unwrap().contains("CONDA"));
    }

    #[test]
    fn test_user_friendly_error_finds_wrapped_error() {
        let error = Err::<(), _>(DockspecError::MissingBaseImage)
            .context("Failed to emit Dockerfile")
            .unwrap_err();
        let ctx = user_friendly_error(error);
        assert!(matches!(ctx.error, DockspecError::MissingBaseImage));
        assert_eq!(ctx.details.as_deref(), Some("Failed to emit Dockerfile"));
    }

    #[test]
    fn test_user_friendly_error_generic_keeps_chain() {
        let error = Err::<(), _>(anyhow::anyhow!("root cause")).context("outer").unwrap_err();
        let ctx = user_friendly_error(error);
        match ctx.error {
            DockspecError::Other {
                message,
            } => {
                assert!(message.starts_with("outer"));
                assert!(message.contains("1: root cause"));
            }
            _ => panic!("Expected Other error"),
        }
    }

    #[test]
    fn test_clone_preserves_variant() {
        let error = DockspecError::BranchMismatch {
            package: "pkg".to_string(),
            existing: "main".to_string(),
            other: "dev".to_string(),
        };
        assert_eq!(error.clone().to_string(), error.to_string());
    }
}
