//! Package requirement grammar shared by `CONDA` and `PIP` tokens.
//!
//! A requirement is `name[extras]specifier` or `name[extras]@url`. Specifiers are
//! comma-separated `op version` clauses; two specifier sets combine by intersection,
//! which for clause lists is the deduplicated union of their clauses.

use anyhow::Result;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use crate::core::DockspecError;

static REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<name>[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(?:\[(?P<extras>[^\]]*)\])?\s*(?P<rest>.*)$",
    )
    .expect("requirement regex is valid")
});

static CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<op>~=|===|==|!=|<=|>=|<|>)\s*(?P<version>[A-Za-z0-9.*+!_-]+)$")
        .expect("specifier clause regex is valid")
});

/// Set of version clauses that must all hold.
///
/// Renders with its clauses sorted and comma-joined, so `>=1.0,<2` and `<2,>=1.0`
/// compare and print identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecifierSet {
    clauses: BTreeSet<String>,
}

impl SpecifierSet {
    /// Parse a comma-separated specifier list; an empty string is the empty set.
    pub fn parse(text: &str) -> Result<Self> {
        let mut clauses = BTreeSet::new();
        for raw in text.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let caps = CLAUSE_RE.captures(raw).ok_or_else(|| DockspecError::InvalidDependency {
                token: text.to_string(),
                reason: format!("invalid version specifier '{raw}'"),
            })?;
            clauses.insert(format!("{}{}", &caps["op"], &caps["version"]));
        }
        Ok(Self {
            clauses,
        })
    }

    /// Whether the set places no constraint.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// AND-combine `other` into this set.
    pub fn intersect(&mut self, other: &Self) {
        self.clauses.extend(other.clauses.iter().cloned());
    }

    /// Number of clauses.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.clauses.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        f.write_str(&joined)
    }
}

impl Serialize for SpecifierSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A parsed package requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    /// Package name as written
    pub name: String,
    /// Requested extras, in declaration order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
    /// Version constraints
    #[serde(skip_serializing_if = "SpecifierSet::is_empty")]
    pub specifier: SpecifierSet,
    /// Direct URL after an `@` marker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Requirement {
    /// Parse a requirement string such as `numpy>=1.24`, `pkg[extra]` or
    /// `pkg@git+https://github.com/org/pkg.git`.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: &str| DockspecError::InvalidDependency {
            token: text.to_string(),
            reason: reason.to_string(),
        };

        let caps = REQUIREMENT_RE
            .captures(text.trim())
            .ok_or_else(|| invalid("expected a package name"))?;

        let extras = caps
            .name("extras")
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let rest = caps.name("rest").map_or("", |m| m.as_str()).trim();
        let (specifier, url) = if let Some(url) = rest.strip_prefix('@') {
            let url = url.trim();
            if url.is_empty() {
                return Err(invalid("empty URL after '@'").into());
            }
            (SpecifierSet::default(), Some(url.to_string()))
        } else {
            (SpecifierSet::parse(rest)?, None)
        };

        Ok(Self {
            name: caps["name"].to_string(),
            extras,
            specifier,
            url,
        })
    }

    /// Name with extras, e.g. `requests[socks]`.
    pub fn name_with_extras(&self) -> String {
        if self.extras.is_empty() {
            self.name.clone()
        } else {
            format!("{}[{}]", self.name, self.extras.join(","))
        }
    }

    /// Name, extras and specifier, e.g. `numpy>=1.24,<2`.
    pub fn name_with_specifier(&self) -> String {
        format!("{}{}", self.name_with_extras(), self.specifier)
    }

    /// Add extras from `other` that are not yet requested.
    pub fn merge_extras(&mut self, other: &Self) {
        for extra in &other.extras {
            if !self.extras.contains(extra) {
                self.extras.push(extra.clone());
            }
        }
    }
}

/// Normalized package identity: lowercase, runs of `-`, `_` and `.` collapsed to `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}
