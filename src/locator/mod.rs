//! Specification file lookup across the search path.
//!
//! Files are searched, in order, in:
//! 1. the working directory (current, or explicitly supplied)
//! 2. every directory of the colon-delimited `DOCKSPEC_SPECS` variable
//! 3. `search_paths` from the global config
//! 4. the bundled `specifications/` directory
//!
//! The first match wins for [`SpecLocator::locate`]; [`SpecLocator::locate_all`]
//! returns every match, which is how aggregation files such as
//! `containers_wconda.txt` are unioned across directories.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::constants::{
    BASE_COMMANDS_FILE, COMMENT_MARKER, PREINSTALLED_IMAGES_FILE, SPEC_DIRS_ENV, SPEC_FILE_SUFFIX,
    bundled_spec_dir,
};
use crate::core::DockspecError;

/// Ordered list of directories holding specification files.
#[derive(Debug, Clone)]
pub struct SpecLocator {
    dirs: Vec<PathBuf>,
}

impl SpecLocator {
    /// Use exactly `dirs` as the search path.
    pub fn with_dirs(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
        }
    }

    /// Build the default search path.
    ///
    /// `cwd` replaces the process working directory; `extra` (from the global
    /// config) is searched after the `DOCKSPEC_SPECS` directories.
    pub fn from_env(cwd: Option<PathBuf>, extra: &[PathBuf]) -> Result<Self> {
        let cwd = match cwd {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let mut dirs = vec![cwd];
        if let Ok(value) = std::env::var(SPEC_DIRS_ENV) {
            dirs.extend(value.split(':').filter(|d| !d.is_empty()).map(PathBuf::from));
        }
        dirs.extend(extra.iter().cloned());
        dirs.push(bundled_spec_dir());
        tracing::debug!("Specification search path: {:?}", dirs);
        Ok(Self {
            dirs,
        })
    }

    /// Directories searched, in order.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// First `file_name` found on the search path.
    pub fn locate(&self, file_name: &str) -> Result<PathBuf> {
        self.find(file_name).ok_or_else(|| {
            DockspecError::SpecNotFound {
                name: file_name.to_string(),
                searched: self.dirs.iter().map(|d| d.display().to_string()).collect(),
            }
            .into()
        })
    }

    /// Every `file_name` found on the search path, in search order.
    pub fn locate_all(&self, file_name: &str) -> Vec<PathBuf> {
        self.dirs.iter().map(|dir| dir.join(file_name)).filter(|path| path.is_file()).collect()
    }

    /// Specification file of the symbolic name `name`.
    pub fn spec_path(&self, name: &str) -> Result<PathBuf> {
        self.locate(&format!("{name}{SPEC_FILE_SUFFIX}"))
    }

    /// Names of every specification reachable on the search path.
    ///
    /// A name present in several directories is listed once.
    pub fn available_specs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for dir in &self.dirs {
            let pattern = dir.join(format!("*{SPEC_FILE_SUFFIX}"));
            let entries = glob::glob(&pattern.to_string_lossy())
                .with_context(|| format!("Invalid search directory: {}", dir.display()))?;
            for path in entries.filter_map(Result::ok) {
                let Some(name) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_suffix(SPEC_FILE_SUFFIX))
                else {
                    continue;
                };
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Base images known to ship conda, unioned over every `containers_wconda.txt`.
    pub fn preinstalled_images(&self) -> Result<Vec<String>> {
        let mut images = Vec::new();
        for path in self.locate_all(PREINSTALLED_IMAGES_FILE) {
            for line in read_list(&path)? {
                if !images.contains(&line) {
                    images.push(line);
                }
            }
        }
        Ok(images)
    }

    /// Instructions inserted after the `FROM` line; empty when no file exists.
    pub fn base_commands(&self) -> Result<Vec<String>> {
        match self.find(BASE_COMMANDS_FILE) {
            Some(path) => read_list(&path),
            None => Ok(Vec::new()),
        }
    }

    fn find(&self, file_name: &str) -> Option<PathBuf> {
        self.dirs.iter().map(|dir| dir.join(file_name)).find(|path| path.is_file())
    }
}

/// Trimmed, non-empty, non-comment lines of a list file.
fn read_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(COMMENT_MARKER))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dirs() -> (TempDir, TempDir) {
        (TempDir::new().unwrap(), TempDir::new().unwrap())
    }

    #[test]
    fn test_first_match_wins() {
        let (first, second) = dirs();
        std::fs::write(first.path().join("a.docker_spec"), "FROM ubuntu:22.04\n").unwrap();
        std::fs::write(second.path().join("a.docker_spec"), "FROM debian:12\n").unwrap();
        let locator =
            SpecLocator::with_dirs(vec![first.path().to_path_buf(), second.path().to_path_buf()]);

        assert_eq!(locator.spec_path("a").unwrap(), first.path().join("a.docker_spec"));
        assert_eq!(locator.locate_all("a.docker_spec").len(), 2);
    }

    #[test]
    fn test_missing_spec_names_file() {
        let (first, _second) = dirs();
        let locator = SpecLocator::with_dirs(vec![first.path().to_path_buf()]);
        let err = locator.spec_path("nope").unwrap_err();
        match err.downcast::<DockspecError>().unwrap() {
            DockspecError::SpecNotFound {
                name,
                searched,
            } => {
                assert_eq!(name, "nope.docker_spec");
                assert_eq!(searched.len(), 1);
            }
            other => panic!("Expected SpecNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_preinstalled_images_union() {
        let (first, second) = dirs();
        std::fs::write(first.path().join(PREINSTALLED_IMAGES_FILE), "a:1\nb:2\n").unwrap();
        std::fs::write(second.path().join(PREINSTALLED_IMAGES_FILE), "# comment\nb:2\n\nc:3\n")
            .unwrap();
        let locator =
            SpecLocator::with_dirs(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(locator.preinstalled_images().unwrap(), vec!["a:1", "b:2", "c:3"]);
    }

    #[test]
    fn test_available_specs_dedups() {
        let (first, second) = dirs();
        std::fs::write(first.path().join("a.docker_spec"), "").unwrap();
        std::fs::write(second.path().join("a.docker_spec"), "").unwrap();
        std::fs::write(second.path().join("b.docker_spec"), "").unwrap();
        std::fs::write(second.path().join("notes.txt"), "").unwrap();
        let locator =
            SpecLocator::with_dirs(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(locator.available_specs().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_base_commands_optional() {
        let (first, _second) = dirs();
        let locator = SpecLocator::with_dirs(vec![first.path().to_path_buf()]);
        assert!(locator.base_commands().unwrap().is_empty());
    }

    #[test]
    fn test_bundled_dir_is_last() {
        let (first, _second) = dirs();
        let locator = SpecLocator::from_env(Some(first.path().to_path_buf()), &[]).unwrap();
        assert_eq!(locator.dirs().first().unwrap(), first.path());
        assert_eq!(locator.dirs().last().unwrap(), &bundled_spec_dir());
    }
}
