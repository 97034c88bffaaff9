//! Cross-cutting helpers.
//!
//! - [`fs`] - atomic writes and recursive copies into the build context
//! - [`platform`] - path expansion, binary lookup, secure removal tool
//! - [`process`] - builder for external commands

pub mod fs;
pub mod platform;
pub mod process;

pub use fs::{copy_dir, ensure_dir, safe_write};
pub use platform::{command_exists, resolve_path, safe_removal_command};
pub use process::{ProcessCommand, Tool};
