//! Platform-specific helpers: home directory, path expansion, binary lookup and
//! the secure removal tool of the host.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::constants::{LINUX_SAFE_REMOVAL, MACOS_SAFE_REMOVAL};

/// Checks if the current platform is macOS.
#[must_use]
pub const fn is_macos() -> bool {
    cfg!(target_os = "macos")
}

/// Gets the home directory path for the current user.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine home directory.\n\n\
            Check that the HOME environment variable is set"
        )
    })
}

/// Expand a leading `~/` and `$VAR` references in `path`.
///
/// # Examples
///
/// ```rust,no_run
/// use dockspec::utils::platform::resolve_path;
///
/// # fn example() -> anyhow::Result<()> {
/// let specs = resolve_path("~/docker_specs")?;
/// let shared = resolve_path("$PROJECT_ROOT/specs")?;
/// # Ok(())
/// # }
/// ```
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = if let Some(stripped) = path.strip_prefix("~/") {
        get_home_dir()?.join(stripped).to_string_lossy().into_owned()
    } else if path.starts_with('~') {
        return Err(anyhow::anyhow!(
            "Invalid path: {path}\n\n\
            Tilde expansion only supports '~/' for home directory."
        ));
    } else {
        path.to_string()
    };

    let expanded = shellexpand::env(&expanded)
        .with_context(|| {
            format!(
                "Failed to expand environment variables in path: {expanded}\n\n\
                Check that every referenced variable is defined (use $VAR or ${{VAR}})"
            )
        })?
        .into_owned();
    Ok(PathBuf::from(expanded))
}

/// Whether `cmd` is an executable on `PATH`.
#[must_use]
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Secure removal binary of the host platform (`gwipe` on macOS, `wipe` elsewhere).
#[must_use]
pub const fn safe_removal_command() -> &'static str {
    if is_macos() { MACOS_SAFE_REMOVAL } else { LINUX_SAFE_REMOVAL }
}
