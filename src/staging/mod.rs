//! Pre-fetching of remote pip sources.
//!
//! In staging mode, pip packages installed from git repositories are cloned on
//! the host into the staging directory and installed from that copy inside the
//! image. This keeps credentials and `git` out of the image.
//!
//! Staging is transitive. After a clone, remote requirements listed in the
//! project's `pyproject.toml` are removed from the file, since pip inside the
//! image could not fetch them, and are staged in turn as ordinary `PIP` entries.
//!
//! ```text
//! PIP qml2@git+https://github.com/org/qml2.git
//!   -> clone into dockspec_staging/qml2
//!   -> pyproject.toml lists helpers @ git+https://github.com/org/helpers.git
//!   -> helpers added to PIP, cloned into dockspec_staging/helpers
//! ```

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::constants::INTERNAL_STAGED_SOURCES_DIR;
use crate::core::DockspecError;
use crate::dependency::{
    Dependency, DependencyCollection, Flag, Mergeable, PipPackage, Requirement,
};

/// Fetches a remote source into a local directory.
#[allow(async_fn_in_trait)]
pub trait SourceFetcher {
    /// Clone `url` (at `branch`, when given) into `dest`.
    async fn fetch(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<()>;
}

impl<F: SourceFetcher> SourceFetcher for &F {
    async fn fetch(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<()> {
        (**self).fetch(url, branch, dest).await
    }
}

/// Extracts remote requirements from a fetched project.
pub trait ProjectInspector {
    /// Remove requirements that carry a remote URL from the project at `dir` and
    /// return them as requirement strings.
    fn take_remote_requirements(&self, dir: &Path) -> Result<Vec<String>>;
}

/// [`ProjectInspector`] reading `[project].dependencies` of `pyproject.toml`.
///
/// The file is edited in place with its formatting preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct PyprojectInspector;

impl ProjectInspector for PyprojectInspector {
    fn take_remote_requirements(&self, dir: &Path) -> Result<Vec<String>> {
        let path = dir.join("pyproject.toml");
        if !path.is_file() {
            tracing::debug!("No pyproject.toml in {}", dir.display());
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut doc = content
            .parse::<toml_edit::DocumentMut>()
            .map_err(DockspecError::from)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let Some(dependencies) = doc
            .get_mut("project")
            .and_then(|project| project.get_mut("dependencies"))
            .and_then(|deps| deps.as_array_mut())
        else {
            return Ok(Vec::new());
        };

        let mut remote = Vec::new();
        dependencies.retain(|value| {
            let Some(text) = value.as_str() else {
                return true;
            };
            let is_remote = Requirement::parse(text).is_ok_and(|req| req.url.is_some());
            if is_remote {
                remote.push(text.trim().to_string());
            }
            !is_remote
        });

        if !remote.is_empty() {
            std::fs::write(&path, doc.to_string())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::debug!("Moved {} remote requirements out of {}", remote.len(), path.display());
        }
        Ok(remote)
    }
}

/// A remote source cloned into the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSource {
    /// Package the source was staged for
    pub package: String,
    /// Declared URL
    pub url: String,
    /// Branch checked out
    pub branch: Option<String>,
    /// Host directory of the clone
    pub path: PathBuf,
}

/// Stages every remote pip source of a collection.
pub struct Stager<F, I> {
    staging_dir: PathBuf,
    fetcher: F,
    inspector: I,
}

impl<F: SourceFetcher, I: ProjectInspector> Stager<F, I> {
    /// Create a stager cloning into `staging_dir`.
    pub fn new(staging_dir: impl Into<PathBuf>, fetcher: F, inspector: I) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            fetcher,
            inspector,
        }
    }

    /// Clone every pip source carrying a URL and point its install at the copy.
    ///
    /// Sources are processed breadth-first; remote requirements discovered in a
    /// cloned project join the `PIP` list and the queue.
    pub async fn stage(&self, collection: &mut DependencyCollection) -> Result<Vec<StagedSource>> {
        let mut queue: Vec<(Flag, String)> = Vec::new();
        for (flag, list) in
            [(Flag::Pip, collection.pip_packages()), (Flag::PipLast, collection.pip_last_packages())]
        {
            queue.extend(
                list.iter()
                    .filter(|p| p.url().is_some())
                    .map(|p| (flag, p.identity().to_string())),
            );
        }

        let mut seen: HashMap<String, StagedSource> = HashMap::new();
        let mut staged = Vec::new();
        let mut cursor = 0;

        while let Some((flag, key)) = queue.get(cursor).cloned() {
            cursor += 1;
            let Some(package) = lookup(collection, flag, &key).cloned() else {
                continue;
            };
            let Some(url) = package.url() else {
                continue;
            };
            let normalized = normalize_url(url);

            if let Some(existing) = seen.get(&normalized) {
                if existing.branch != package.branch {
                    return Err(DockspecError::StagedBranchMismatch {
                        url: normalized,
                        existing: existing.branch.clone().unwrap_or_else(|| "default".into()),
                        other: package.branch.clone().unwrap_or_else(|| "default".into()),
                    }
                    .into());
                }
                let dir_name = existing.package.clone();
                set_staged_path(collection, flag, &key, &dir_name);
                continue;
            }

            let dest = self.staging_dir.join(package.name());
            self.clone_with_fallback(url, package.branch.as_deref(), &dest).await?;
            set_staged_path(collection, flag, &key, package.name());

            for requirement in self.inspector.take_remote_requirements(&dest)? {
                let discovered = PipPackage::parse(&requirement)?;
                tracing::debug!(
                    "Found remote requirement '{}' in {}",
                    discovered.name(),
                    package.name()
                );
                let discovered_key = discovered.identity().to_string();
                collection.insert(Dependency::Pip(discovered))?;
                if !queue.iter().any(|(f, k)| *f == Flag::Pip && *k == discovered_key) {
                    queue.push((Flag::Pip, discovered_key));
                }
            }

            let source = StagedSource {
                package: package.name().to_string(),
                url: url.to_string(),
                branch: package.branch.clone(),
                path: dest,
            };
            seen.insert(normalized, source.clone());
            staged.push(source);
        }

        tracing::info!("Staged {} remote sources into {}", staged.len(), self.staging_dir.display());
        Ok(staged)
    }

    async fn clone_with_fallback(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<()> {
        let canonical = url.strip_prefix("git+").unwrap_or(url);
        let first = match self.fetcher.fetch(canonical, branch, dest).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let Some(alternative) = alternative_url(canonical) else {
            tracing::debug!("Clone of {canonical} failed: {first:#}");
            return Err(DockspecError::CloneExhausted {
                url: canonical.to_string(),
                alternative: None,
            }
            .into());
        };
        tracing::debug!("Clone of {canonical} failed ({first:#}), trying {alternative}");
        if dest.exists() {
            std::fs::remove_dir_all(dest)
                .with_context(|| format!("Failed to clear {}", dest.display()))?;
        }
        match self.fetcher.fetch(&alternative, branch, dest).await {
            Ok(()) => Ok(()),
            Err(second) => {
                tracing::debug!("Clone of {alternative} failed: {second:#}");
                Err(DockspecError::CloneExhausted {
                    url: canonical.to_string(),
                    alternative: Some(alternative),
                }
                .into())
            }
        }
    }
}

fn lookup<'a>(collection: &'a DependencyCollection, flag: Flag, key: &str) -> Option<&'a PipPackage> {
    match flag {
        Flag::PipLast => collection.pip_last_packages().get(key),
        _ => collection.pip_packages().get(key),
    }
}

fn set_staged_path(collection: &mut DependencyCollection, flag: Flag, key: &str, dir_name: &str) {
    let list = match flag {
        Flag::PipLast => collection.pip_last_packages_mut(),
        _ => collection.pip_packages_mut(),
    };
    if let Some(package) = list.get_mut(key) {
        package.staged_path = Some(format!("{INTERNAL_STAGED_SOURCES_DIR}/{dir_name}"));
    }
}

/// Comparable form of a repository URL.
///
/// Drops the `git+` prefix, rewrites ssh forms to https and strips `.git` and
/// trailing slashes.
pub fn normalize_url(url: &str) -> String {
    let url = url.strip_prefix("git+").unwrap_or(url);
    let url = if let Some(rest) = url.strip_prefix("ssh://git@") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("git@") {
        format!("https://{}", rest.replacen(':', "/", 1))
    } else {
        url.to_string()
    };
    let url = url.trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url).to_string()
}

/// The other access form of a GitHub URL: https and ssh swap.
pub fn alternative_url(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("https://github.com/") {
        Some(format!("git@github.com:{rest}"))
    } else if let Some(rest) = url.strip_prefix("git@github.com:") {
        Some(format!("https://github.com/{rest}"))
    } else {
        url.strip_prefix("ssh://git@github.com/").map(|rest| format!("https://github.com/{rest}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records fetch attempts and fails for URLs in `failing`.
    #[derive(Default)]
    struct FakeFetcher {
        failing: Vec<String>,
        pyprojects: HashMap<String, String>,
        attempts: Mutex<Vec<(String, Option<String>)>>,
    }

    impl SourceFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<()> {
            self.attempts.lock().unwrap().push((url.to_string(), branch.map(str::to_string)));
            if self.failing.iter().any(|f| f == url) {
                anyhow::bail!("repository not found");
            }
            std::fs::create_dir_all(dest)?;
            if let Some(pyproject) = self.pyprojects.get(url) {
                std::fs::write(dest.join("pyproject.toml"), pyproject)?;
            }
            Ok(())
        }
    }

    fn pip(tokens: &[&str]) -> DependencyCollection {
        let mut deps = DependencyCollection::new();
        deps.add_tokens(Flag::Pip, tokens).unwrap();
        deps
    }

    #[test]
    fn test_normalize_url() {
        let forms = [
            "git+https://github.com/org/lib.git",
            "https://github.com/org/lib/",
            "git+ssh://git@github.com/org/lib.git",
            "git@github.com:org/lib.git",
        ];
        for form in forms {
            assert_eq!(normalize_url(form), "https://github.com/org/lib", "{form}");
        }
    }

    #[test]
    fn test_alternative_url() {
        assert_eq!(
            alternative_url("https://github.com/org/lib.git").as_deref(),
            Some("git@github.com:org/lib.git")
        );
        assert_eq!(
            alternative_url("git@github.com:org/lib.git").as_deref(),
            Some("https://github.com/org/lib.git")
        );
        assert_eq!(alternative_url("https://gitlab.com/org/lib.git"), None);
    }

    #[tokio::test]
    async fn test_stage_sets_paths_and_dedups() {
        let dir = TempDir::new().unwrap();
        let mut deps = pip(&[
            "lib@git+https://github.com/org/lib.git@main",
            "requests",
            "lib-alias@git+ssh://git@github.com/org/lib.git@main",
        ]);
        let stager = Stager::new(dir.path(), FakeFetcher::default(), PyprojectInspector);
        let staged = stager.stage(&mut deps).await.unwrap();

        assert_eq!(staged.len(), 1);
        assert_eq!(stager.fetcher.attempts.lock().unwrap().len(), 1);
        let paths: Vec<_> = deps.pip_packages().iter().map(|p| p.staged_path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                Some("/staged_sources/lib".to_string()),
                None,
                Some("/staged_sources/lib".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_stage_branch_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut deps = pip(&[
            "lib@git+https://github.com/org/lib.git@main",
            "other@git+https://github.com/org/lib@dev",
        ]);
        let stager = Stager::new(dir.path(), FakeFetcher::default(), PyprojectInspector);
        let err = stager.stage(&mut deps).await.unwrap_err();
        assert!(matches!(
            err.downcast::<DockspecError>().unwrap(),
            DockspecError::StagedBranchMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_clone_falls_back_to_alternative() {
        let dir = TempDir::new().unwrap();
        let mut deps = pip(&["lib@git+https://github.com/org/lib.git"]);
        let fetcher = FakeFetcher {
            failing: vec!["https://github.com/org/lib.git".to_string()],
            ..FakeFetcher::default()
        };
        let stager = Stager::new(dir.path(), fetcher, PyprojectInspector);
        stager.stage(&mut deps).await.unwrap();

        let attempts = stager.fetcher.attempts.lock().unwrap();
        assert_eq!(attempts[1].0, "git@github.com:org/lib.git");
    }

    #[tokio::test]
    async fn test_clone_exhausted() {
        let dir = TempDir::new().unwrap();
        let mut deps = pip(&["lib@git+https://github.com/org/lib.git"]);
        let fetcher = FakeFetcher {
            failing: vec![
                "https://github.com/org/lib.git".to_string(),
                "git@github.com:org/lib.git".to_string(),
            ],
            ..FakeFetcher::default()
        };
        let stager = Stager::new(dir.path(), fetcher, PyprojectInspector);
        match stager.stage(&mut deps).await.unwrap_err().downcast::<DockspecError>().unwrap() {
            DockspecError::CloneExhausted {
                url,
                alternative,
            } => {
                assert_eq!(url, "https://github.com/org/lib.git");
                assert_eq!(alternative.as_deref(), Some("git@github.com:org/lib.git"));
            }
            other => panic!("Expected CloneExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clone_without_alternative_advises_access_rights() {
        let dir = TempDir::new().unwrap();
        let mut deps = pip(&["lib@git+https://gitlab.example.com/org/lib.git"]);
        let fetcher = FakeFetcher {
            failing: vec!["https://gitlab.example.com/org/lib.git".to_string()],
            ..FakeFetcher::default()
        };
        let stager = Stager::new(dir.path(), fetcher, PyprojectInspector);
        let err = stager.stage(&mut deps).await.unwrap_err();
        assert_eq!(stager.fetcher.attempts.lock().unwrap().len(), 1);
        assert!(err.to_string().contains("access rights"));
        match err.downcast::<DockspecError>().unwrap() {
            DockspecError::CloneExhausted {
                url,
                alternative,
            } => {
                assert_eq!(url, "https://gitlab.example.com/org/lib.git");
                assert!(alternative.is_none());
            }
            other => panic!("Expected CloneExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transitive_requirements_are_staged() {
        let dir = TempDir::new().unwrap();
        let mut deps = pip(&["lib@git+https://github.com/org/lib.git"]);
        let mut pyprojects = HashMap::new();
        pyprojects.insert(
            "https://github.com/org/lib.git".to_string(),
            r#"[project]
name = "lib"
dependencies = [
    "numpy>=1.24",
    "helpers @ git+https://github.com/org/helpers.git",
]
"#
            .to_string(),
        );
        let fetcher = FakeFetcher {
            pyprojects,
            ..FakeFetcher::default()
        };
        let stager = Stager::new(dir.path(), fetcher, PyprojectInspector);
        let staged = stager.stage(&mut deps).await.unwrap();

        let names: Vec<_> = staged.iter().map(|s| s.package.as_str()).collect();
        assert_eq!(names, vec!["lib", "helpers"]);
        let helpers = deps.pip_packages().get("helpers").unwrap();
        assert_eq!(helpers.staged_path.as_deref(), Some("/staged_sources/helpers"));

        let rewritten = std::fs::read_to_string(dir.path().join("lib/pyproject.toml")).unwrap();
        assert!(rewritten.contains("numpy>=1.24"));
        assert!(!rewritten.contains("helpers"));
    }

    #[test]
    fn test_inspector_without_pyproject() {
        let dir = TempDir::new().unwrap();
        assert!(PyprojectInspector.take_remote_requirements(dir.path()).unwrap().is_empty());
    }
}
