//! Merged, per-flag dependency lists.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;

use super::env_export::EnvExport;
use super::records::{
    BaseImage, CondaPackage, OsPackage, PathModule, PipPackage, PrivateSource, VersionPin,
};
use super::{Dependency, Flag, Mergeable};
use crate::core::DockspecError;

/// Ordered list of one dependency kind with identity-unique entries.
///
/// Adding an entry whose identity is already present merges it into the existing
/// entry instead of appending.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct DependencyList<T> {
    entries: Vec<T>,
}

impl<T> Default for DependencyList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Mergeable> DependencyList<T> {
    /// Insert `dep`, merging with an entry of the same identity.
    pub fn add(&mut self, dep: T) -> Result<()> {
        match self.entries.iter_mut().find(|existing| existing.same_identity(&dep)) {
            Some(existing) => existing.merge(dep),
            None => {
                self.entries.push(dep);
                Ok(())
            }
        }
    }

    /// Entry with the given identity.
    pub fn get(&self, identity: &str) -> Option<&T> {
        self.entries.iter().find(|e| e.identity() == identity)
    }

    /// Mutable entry with the given identity.
    pub fn get_mut(&mut self, identity: &str) -> Option<&mut T> {
        self.entries.iter_mut().find(|e| e.identity() == identity)
    }
}

impl<T> DependencyList<T> {
    /// Entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    /// Mutable entries in insertion order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.entries.iter_mut()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry.
    pub fn first(&self) -> Option<&T> {
        self.entries.first()
    }
}

impl<'a, T> IntoIterator for &'a DependencyList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Every dependency of a build, merged across the specification chain.
///
/// A flag mentioned with no tokens still counts as present; `YML` and token-less
/// `PRIVATE_GIT` lines only take effect this way.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyCollection {
    present: BTreeSet<Flag>,
    base: DependencyList<BaseImage>,
    apt: DependencyList<OsPackage>,
    conda_version: DependencyList<VersionPin>,
    python_version: DependencyList<VersionPin>,
    private_git: DependencyList<PrivateSource>,
    conda: DependencyList<CondaPackage>,
    pip: DependencyList<PipPackage>,
    pip_last: DependencyList<PipPackage>,
    python_path: DependencyList<PathModule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    env_export: Option<EnvExport>,
}

impl DependencyCollection {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `flag` was declared.
    pub fn mark_present(&mut self, flag: Flag) {
        self.present.insert(flag);
    }

    /// Whether `flag` was declared anywhere in the chain.
    pub fn contains(&self, flag: Flag) -> bool {
        self.present.contains(&flag)
    }

    /// Flags declared, in emission order.
    pub fn flags(&self) -> impl Iterator<Item = Flag> + '_ {
        self.present.iter().copied()
    }

    /// Parse every token of one flag and merge the resulting records.
    pub fn add_tokens<S: AsRef<str>>(&mut self, flag: Flag, tokens: &[S]) -> Result<()> {
        self.mark_present(flag);
        for token in tokens {
            self.insert(Dependency::parse(flag, token.as_ref())?)?;
        }
        Ok(())
    }

    /// Merge one record into the list of its kind.
    pub fn insert(&mut self, dep: Dependency) -> Result<()> {
        self.mark_present(dep.flag());
        match dep {
            Dependency::Base(d) => self.base.add(d),
            Dependency::Os(d) => self.apt.add(d),
            Dependency::CondaVersion(d) => self.conda_version.add(d),
            Dependency::PythonVersion(d) => self.python_version.add(d),
            Dependency::PrivateSource(d) => self.private_git.add(d),
            Dependency::Conda(d) => self.conda.add(d),
            Dependency::Pip(d) => self.pip.add(d),
            Dependency::PipLast(d) => self.pip_last.add(d),
            Dependency::PathModule(d) => self.python_path.add(d),
        }
    }

    /// Attach the environment export; a second export is an error.
    pub fn set_env_export(&mut self, export: EnvExport) -> Result<()> {
        self.mark_present(Flag::Yml);
        match &mut self.env_export {
            Some(existing) => existing.merge(export),
            None => {
                self.env_export = Some(export);
                Ok(())
            }
        }
    }

    /// The single base image; a second `FROM` is already rejected on insert.
    pub fn base(&self) -> Result<&BaseImage> {
        self.base.first().ok_or_else(|| DockspecError::MissingBaseImage.into())
    }

    /// Whether a base image is declared.
    pub fn has_base(&self) -> bool {
        !self.base.is_empty()
    }

    /// OS packages.
    pub fn os_packages(&self) -> &DependencyList<OsPackage> {
        &self.apt
    }

    /// Conda version pin.
    pub fn conda_version(&self) -> Option<&VersionPin> {
        self.conda_version.first()
    }

    /// Python version pin.
    pub fn python_version(&self) -> Option<&VersionPin> {
        self.python_version.first()
    }

    /// Private source hosts.
    pub fn private_sources(&self) -> &DependencyList<PrivateSource> {
        &self.private_git
    }

    /// Whether private sources are involved.
    pub fn contains_private(&self) -> bool {
        self.contains(Flag::PrivateGit)
    }

    /// Conda packages.
    pub fn conda_packages(&self) -> &DependencyList<CondaPackage> {
        &self.conda
    }

    /// Pip packages.
    pub fn pip_packages(&self) -> &DependencyList<PipPackage> {
        &self.pip
    }

    /// Mutable pip packages.
    pub fn pip_packages_mut(&mut self) -> &mut DependencyList<PipPackage> {
        &mut self.pip
    }

    /// Pip packages installed after all others.
    pub fn pip_last_packages(&self) -> &DependencyList<PipPackage> {
        &self.pip_last
    }

    /// Mutable deferred pip packages.
    pub fn pip_last_packages_mut(&mut self) -> &mut DependencyList<PipPackage> {
        &mut self.pip_last
    }

    /// Modules exposed through `PYTHONPATH`.
    pub fn path_modules(&self) -> &DependencyList<PathModule> {
        &self.python_path
    }

    /// Whether an environment export was requested with `YML`.
    pub fn requests_env_export(&self) -> bool {
        self.contains(Flag::Yml)
    }

    /// Attached environment export.
    pub fn env_export(&self) -> Option<&EnvExport> {
        self.env_export.as_ref()
    }

    /// Names of packages declared for conda or pip, as written.
    pub fn declared_package_names(&self) -> Vec<String> {
        let conda = self.conda.iter().map(|p| p.requirement.name.clone());
        let pip = self.pip.iter().chain(self.pip_last.iter()).map(|p| p.name().to_string());
        conda.chain(pip).collect()
    }
}
