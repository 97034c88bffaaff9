//! Test utilities for dockspec
//!
//! Helpers shared by unit and integration tests: one-time logging setup and a
//! throwaway specification directory.
//!
//! # Example
//!
//! ```rust,no_run
//! use dockspec::test_utils::SpecDir;
//!
//! let specs = SpecDir::new().unwrap();
//! specs.write("base", "FROM ubuntu:22.04\nAPT curl\n").unwrap();
//! specs.write("child", "PARENT base\nPIP tqdm\n").unwrap();
//! let locator = specs.locator();
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::constants::SPEC_FILE_SUFFIX;
use crate::locator::SpecLocator;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; without either, logging stays off.
///
/// ```bash
/// RUST_LOG=dockspec=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true) // Show targets like "process"
            .try_init();
    });
}

/// Temporary directory of specification files.
pub struct SpecDir {
    _temp_dir: TempDir, // Keep alive for RAII cleanup
    path: PathBuf,
}

impl SpecDir {
    /// Create an empty specification directory.
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().context("Failed to create temp dir")?;
        let path = temp_dir.path().join("specs");
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            _temp_dir: temp_dir,
            path,
        })
    }

    /// Directory holding the specifications.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scratch directory next to the specifications, created on demand.
    pub fn scratch(&self, name: &str) -> Result<PathBuf> {
        let dir = self._temp_dir.path().join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write `<name>.docker_spec`.
    pub fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.path.join(format!("{name}{SPEC_FILE_SUFFIX}"));
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Write an auxiliary file such as `containers_wconda.txt`.
    pub fn write_file(&self, file_name: &str, content: &str) -> Result<PathBuf> {
        let path = self.path.join(file_name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Locator searching only this directory.
    pub fn locator(&self) -> SpecLocator {
        SpecLocator::with_dirs(vec![self.path.clone()])
    }
}
