//! Parent-chain resolution.
//!
//! Starting from a root specification, the resolver walks `PARENT` references
//! breadth-first and merges every file's declarations into one
//! [`DependencyCollection`]. The walk is a worklist with a cursor: each name is
//! visited once, so cycles and diamonds are harmless.
//!
//! Merge order is exactly visit order. The root's own declarations are merged
//! first, which is what makes first-wins records (version pins) prefer the
//! specification closest to the root.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::dependency::DependencyCollection;
use crate::locator::SpecLocator;
use crate::parser;

/// Result of resolving a specification chain.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    /// Merged dependencies
    pub collection: DependencyCollection,
    /// Specification names, in visit order
    pub chain: Vec<String>,
}

/// Resolves a specification and its ancestors against a search path.
pub struct Resolver<'a> {
    locator: &'a SpecLocator,
}

impl<'a> Resolver<'a> {
    /// Create a resolver reading files through `locator`.
    pub const fn new(locator: &'a SpecLocator) -> Self {
        Self {
            locator,
        }
    }

    /// Resolve `root` and every specification it inherits from.
    pub fn resolve(&self, root: &str) -> Result<Resolution> {
        let mut collection = DependencyCollection::new();
        let mut pending = vec![root.to_string()];
        let mut cursor = 0;

        while let Some(name) = pending.get(cursor).cloned() {
            let path = self.locator.spec_path(&name)?;
            tracing::debug!("Resolving specification '{}' from {}", name, path.display());

            let spec = parser::parse(&path)?;
            for parent in spec.parents {
                if !pending.contains(&parent) {
                    tracing::debug!("Queueing parent '{}' of '{}'", parent, name);
                    pending.push(parent);
                }
            }
            for (flag, tokens) in &spec.flagged {
                collection
                    .add_tokens(*flag, tokens)
                    .with_context(|| format!("While merging {flag} from '{name}'"))?;
            }
            cursor += 1;
        }

        tracing::debug!("Resolved chain: {}", pending.join(" -> "));
        Ok(Resolution {
            collection,
            chain: pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DockspecError;
    use crate::dependency::Flag;
    use tempfile::TempDir;

    fn write_specs(specs: &[(&str, &str)]) -> (TempDir, SpecLocator) {
        let dir = TempDir::new().unwrap();
        for (name, content) in specs {
            std::fs::write(dir.path().join(format!("{name}.docker_spec")), content).unwrap();
        }
        let locator = SpecLocator::with_dirs(vec![dir.path().to_path_buf()]);
        (dir, locator)
    }

    fn error_of(result: Result<Resolution>) -> DockspecError {
        let err = result.unwrap_err();
        err.chain()
            .find_map(|e| e.downcast_ref::<DockspecError>())
            .cloned()
            .unwrap_or_else(|| panic!("No DockspecError in {err:?}"))
    }

    #[test]
    fn test_parent_child_specifiers_intersect() {
        let (_dir, locator) = write_specs(&[
            ("child", "PARENT base\nCONDA numpy>=1.20\n"),
            ("base", "FROM ubuntu:22.04\nCONDA numpy<2\n"),
        ]);
        let resolution = Resolver::new(&locator).resolve("child").unwrap();
        let conda = resolution.collection.conda_packages();
        assert_eq!(conda.len(), 1);
        assert_eq!(conda.first().unwrap().install_spec(), "numpy<2,>=1.20");
        assert_eq!(resolution.chain, vec!["child", "base"]);
    }

    #[test]
    fn test_cycles_are_tolerated() {
        let (_dir, locator) = write_specs(&[
            ("a", "PARENT b\nFROM ubuntu:22.04\nAPT curl\n"),
            ("b", "PARENT a\nAPT curl wget\n"),
        ]);
        let resolution = Resolver::new(&locator).resolve("a").unwrap();
        assert_eq!(resolution.chain, vec!["a", "b"]);
        let apt: Vec<_> =
            resolution.collection.os_packages().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(apt, vec!["curl", "wget"]);
    }

    #[test]
    fn test_breadth_first_order() {
        let (_dir, locator) = write_specs(&[
            ("root", "PARENT left right\nPYTHONV 3.11\n"),
            ("left", "PARENT deep\nPYTHONV 3.10\n"),
            ("right", "FROM ubuntu:22.04\nPYTHONV 3.9\n"),
            ("deep", "PYTHONV 3.8\n"),
        ]);
        let resolution = Resolver::new(&locator).resolve("root").unwrap();
        assert_eq!(resolution.chain, vec!["root", "left", "right", "deep"]);
        assert_eq!(resolution.collection.python_version().unwrap().version, "3.11");
    }

    #[test]
    fn test_duplicate_base_is_fatal() {
        let (_dir, locator) = write_specs(&[
            ("child", "PARENT base\nFROM ubuntu:22.04\n"),
            ("base", "FROM ubuntu:20.04\n"),
        ]);
        let err = error_of(Resolver::new(&locator).resolve("child"));
        assert!(matches!(err, DockspecError::DuplicateBaseImage { .. }));
    }

    #[test]
    fn test_different_base_images_are_fatal() {
        let (_dir, locator) = write_specs(&[
            ("child", "PARENT base\nFROM ubuntu:22.04\n"),
            ("base", "FROM debian:12\n"),
        ]);
        match error_of(Resolver::new(&locator).resolve("child")) {
            DockspecError::DuplicateBaseImage {
                existing,
                duplicate,
            } => {
                assert_eq!(existing, "ubuntu:22.04");
                assert_eq!(duplicate, "debian:12");
            }
            other => panic!("Expected DuplicateBaseImage, got {other:?}"),
        }
    }

    #[test]
    fn test_branch_adoption_and_conflict() {
        let (_dir, locator) = write_specs(&[
            ("child", "PARENT base\nFROM ubuntu:22.04\nPIP lib@git+https://github.com/o/lib.git\n"),
            ("base", "PIP lib@git+https://github.com/o/lib.git@dev\n"),
        ]);
        let resolution = Resolver::new(&locator).resolve("child").unwrap();
        let lib = resolution.collection.pip_packages().first().unwrap();
        assert_eq!(lib.branch.as_deref(), Some("dev"));

        let (_dir, locator) = write_specs(&[
            ("child", "PARENT base\nPIP lib@git+https://github.com/o/lib.git@main\n"),
            ("base", "PIP lib@git+https://github.com/o/lib.git@dev\n"),
        ]);
        match error_of(Resolver::new(&locator).resolve("child")) {
            DockspecError::BranchMismatch {
                package,
                existing,
                other,
            } => {
                assert_eq!(package, "lib");
                assert_eq!(existing, "main");
                assert_eq!(other, "dev");
            }
            other => panic!("Expected BranchMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_flag_aborts_before_merge() {
        let (_dir, locator) = write_specs(&[(
            "bad",
            "FROM ubuntu:22.04\nAPT curl\nFOO bar\n",
        )]);
        let err = error_of(Resolver::new(&locator).resolve("bad"));
        assert!(matches!(err, DockspecError::UnknownFlag { .. }));
    }

    #[test]
    fn test_missing_parent_is_fatal() {
        let (_dir, locator) = write_specs(&[("child", "PARENT ghost\nFROM ubuntu:22.04\n")]);
        match error_of(Resolver::new(&locator).resolve("child")) {
            DockspecError::SpecNotFound {
                name,
                ..
            } => assert_eq!(name, "ghost.docker_spec"),
            other => panic!("Expected SpecNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_token_less_flags_are_present() {
        let (_dir, locator) = write_specs(&[("yml", "FROM continuumio/miniconda3:latest\nYML\n")]);
        let resolution = Resolver::new(&locator).resolve("yml").unwrap();
        assert!(resolution.collection.contains(Flag::Yml));
        assert!(resolution.collection.requests_env_export());
    }
}
