//! Typed dependency records and the flags that introduce them.
//!
//! Each specification line starts with a [`Flag`]; every token after it becomes a
//! [`Dependency`] record. Records of the same kind are matched by identity and
//! combined through [`Mergeable::merge`]:
//!
//! | Flag | Record | Identity | Merge |
//! |------|--------|----------|-------|
//! | `FROM` | [`BaseImage`] | image name | always an error |
//! | `APT` | [`OsPackage`] | name | no-op |
//! | `CONDAV`, `PYTHONV` | [`VersionPin`] | singleton | first wins |
//! | `YML` | [`EnvExport`] | singleton | always an error |
//! | `PRIVATE_GIT` | [`PrivateSource`] | name | no-op |
//! | `CONDA` | [`CondaPackage`] | normalized name | specifiers intersected |
//! | `PIP`, `PIPLAST` | [`PipPackage`] | normalized name | URL/branch checked, specifiers intersected |
//! | `PYTHONPATH` | [`PathModule`] | name | no-op |
//!
//! The order of [`Flag`] variants is the order in which the emitter writes their
//! instructions.

pub mod collection;
pub mod env_export;
pub mod records;
pub mod requirement;

pub use collection::{DependencyCollection, DependencyList};
pub use env_export::{EnvExport, EnvironmentExporter};
pub use records::{
    BaseImage, CondaPackage, OsPackage, PathModule, PipPackage, PrivateSource, VersionPin,
};
pub use requirement::{Requirement, SpecifierSet};

use anyhow::Result;
use serde::Serialize;
use std::fmt;

use crate::core::DockspecError;

/// Recognized dependency flags, declared in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Flag {
    /// `FROM` base image
    #[serde(rename = "FROM")]
    From,
    /// `APT` OS packages
    #[serde(rename = "APT")]
    Apt,
    /// `CONDAV` conda version pin
    #[serde(rename = "CONDAV")]
    CondaVersion,
    /// `PYTHONV` python version pin
    #[serde(rename = "PYTHONV")]
    PythonVersion,
    /// `YML` environment export of the base image
    #[serde(rename = "YML")]
    Yml,
    /// `PRIVATE_GIT` private source hosts
    #[serde(rename = "PRIVATE_GIT")]
    PrivateGit,
    /// `CONDA` conda packages
    #[serde(rename = "CONDA")]
    Conda,
    /// `PIP` pip packages
    #[serde(rename = "PIP")]
    Pip,
    /// `PIPLAST` pip packages installed after all others
    #[serde(rename = "PIPLAST")]
    PipLast,
    /// `PYTHONPATH` modules copied into the image
    #[serde(rename = "PYTHONPATH")]
    PythonPath,
}

impl Flag {
    /// Every flag, in emission order.
    pub const ALL: [Self; 10] = [
        Self::From,
        Self::Apt,
        Self::CondaVersion,
        Self::PythonVersion,
        Self::Yml,
        Self::PrivateGit,
        Self::Conda,
        Self::Pip,
        Self::PipLast,
        Self::PythonPath,
    ];

    /// Keyword used in specification files.
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::From => "FROM",
            Self::Apt => "APT",
            Self::CondaVersion => "CONDAV",
            Self::PythonVersion => "PYTHONV",
            Self::Yml => "YML",
            Self::PrivateGit => "PRIVATE_GIT",
            Self::Conda => "CONDA",
            Self::Pip => "PIP",
            Self::PipLast => "PIPLAST",
            Self::PythonPath => "PYTHONPATH",
        }
    }

    /// Flag for a keyword, if recognized.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.keyword() == keyword)
    }

    /// Closest known keyword to a misspelled one, including `PARENT`.
    pub fn closest(keyword: &str) -> Option<&'static str> {
        let upper = keyword.to_uppercase();
        Self::ALL
            .iter()
            .map(|f| f.keyword())
            .chain(std::iter::once(crate::constants::PARENT_FLAG))
            .map(|k| (k, strsim::levenshtein(&upper, k)))
            .filter(|(_, distance)| *distance <= 2)
            .min_by_key(|(_, distance)| *distance)
            .map(|(k, _)| k)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Shared identity and merge contract of every dependency kind.
pub trait Mergeable {
    /// Key deciding whether two records describe the same dependency.
    fn identity(&self) -> &str;

    /// Whether `other` has the same identity.
    fn same_identity(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }

    /// Fold `other` (same identity) into `self`.
    fn merge(&mut self, other: Self) -> Result<()>
    where
        Self: Sized;
}

/// A dependency record constructed from one specification token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// `FROM`
    Base(BaseImage),
    /// `APT`
    Os(OsPackage),
    /// `CONDAV`
    CondaVersion(VersionPin),
    /// `PYTHONV`
    PythonVersion(VersionPin),
    /// `PRIVATE_GIT`
    PrivateSource(PrivateSource),
    /// `CONDA`
    Conda(CondaPackage),
    /// `PIP`
    Pip(PipPackage),
    /// `PIPLAST`
    PipLast(PipPackage),
    /// `PYTHONPATH`
    PathModule(PathModule),
}

impl Dependency {
    /// Construct the record for one token of `flag`.
    pub fn parse(flag: Flag, token: &str) -> Result<Self> {
        let name = || token.to_string();
        Ok(match flag {
            Flag::From => Self::Base(BaseImage::parse(token)?),
            Flag::Apt => Self::Os(OsPackage {
                name: name(),
            }),
            Flag::CondaVersion => Self::CondaVersion(VersionPin {
                version: name(),
            }),
            Flag::PythonVersion => Self::PythonVersion(VersionPin {
                version: name(),
            }),
            Flag::PrivateGit => Self::PrivateSource(PrivateSource {
                name: name(),
            }),
            Flag::Conda => Self::Conda(CondaPackage::parse(token)?),
            Flag::Pip => Self::Pip(PipPackage::parse(token)?),
            Flag::PipLast => Self::PipLast(PipPackage::parse(token)?),
            Flag::PythonPath => Self::PathModule(PathModule {
                name: name(),
            }),
            Flag::Yml => {
                return Err(DockspecError::InvalidDependency {
                    token: name(),
                    reason: "YML takes no arguments; the export is read from the base image"
                        .to_string(),
                }
                .into());
            }
        })
    }

    /// Flag introducing this record.
    pub const fn flag(&self) -> Flag {
        match self {
            Self::Base(_) => Flag::From,
            Self::Os(_) => Flag::Apt,
            Self::CondaVersion(_) => Flag::CondaVersion,
            Self::PythonVersion(_) => Flag::PythonVersion,
            Self::PrivateSource(_) => Flag::PrivateGit,
            Self::Conda(_) => Flag::Conda,
            Self::Pip(_) => Flag::Pip,
            Self::PipLast(_) => Flag::PipLast,
            Self::PathModule(_) => Flag::PythonPath,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_round_trip() {
        for flag in Flag::ALL {
            assert_eq!(Flag::from_keyword(flag.keyword()), Some(flag));
        }
        assert_eq!(Flag::from_keyword("PARENT"), None);
        assert_eq!(Flag::from_keyword("apt"), None);
    }

    #[test]
    fn test_flag_order_is_emission_order() {
        let mut sorted = Flag::ALL;
        sorted.sort();
        assert_eq!(sorted, Flag::ALL);
        assert!(Flag::Apt < Flag::Conda);
        assert!(Flag::Pip < Flag::PipLast);
    }

    #[test]
    fn test_closest_keyword() {
        assert_eq!(Flag::closest("CODNA"), Some("CONDA"));
        assert_eq!(Flag::closest("parent"), Some("PARENT"));
        assert_eq!(Flag::closest("FOO"), Some("FROM"));
        assert_eq!(Flag::closest("BANANAS"), None);
    }

    #[test]
    fn test_yml_tokens_rejected() {
        assert!(Dependency::parse(Flag::Yml, "env.yml").is_err());
    }

    #[test]
    fn test_parse_routes_to_kind() {
        let dep = Dependency::parse(Flag::PipLast, "qml2").unwrap();
        assert_eq!(dep.flag(), Flag::PipLast);
        assert!(matches!(dep, Dependency::PipLast(_)));
    }
}
