//! Reader for flag-tagged specification files.
//!
//! Every non-blank line starts with a flag followed by whitespace-separated
//! tokens:
//!
//! ```text
//! PARENT ubuntu_conda
//! FROM ubuntu:22.04     # inline comments end the line
//! CONDA numpy;conda-forge
//! ```
//!
//! Parsing only collects raw strings. Records are built and merged by the
//! resolver once the whole file has been read, so a malformed line leaves the
//! collection untouched.

use anyhow::{Context, Result};
use std::path::Path;

use crate::constants::{COMMENT_MARKER, PARENT_FLAG};
use crate::core::DockspecError;
use crate::dependency::Flag;

/// Raw content of one specification file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSpec {
    /// Parent names, in first-mention order, without duplicates
    pub parents: Vec<String>,
    /// Raw tokens per flag, in first-mention order of the flag
    pub flagged: Vec<(Flag, Vec<String>)>,
}

impl ParsedSpec {
    /// Raw tokens declared for `flag`, if the flag appears in the file.
    pub fn tokens(&self, flag: Flag) -> Option<&[String]> {
        self.flagged.iter().find(|(f, _)| *f == flag).map(|(_, tokens)| tokens.as_slice())
    }

    fn push(&mut self, flag: Flag, tokens: impl Iterator<Item = String>) {
        match self.flagged.iter_mut().find(|(f, _)| *f == flag) {
            Some((_, existing)) => existing.extend(tokens),
            None => self.flagged.push((flag, tokens.collect())),
        }
    }
}

/// Read and parse the specification file at `path`.
pub fn parse(path: &Path) -> Result<ParsedSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read specification file: {}", path.display()))?;
    parse_str(&content, &path.display().to_string())
}

/// Parse specification text; `origin` names the source in errors.
pub fn parse_str(content: &str, origin: &str) -> Result<ParsedSpec> {
    let mut spec = ParsedSpec::default();

    for line in content.lines() {
        let mut tokens =
            line.split_whitespace().take_while(|token| !token.starts_with(COMMENT_MARKER));
        let Some(keyword) = tokens.next() else {
            continue;
        };

        if keyword == PARENT_FLAG {
            for parent in tokens {
                if !spec.parents.iter().any(|p| p == parent) {
                    spec.parents.push(parent.to_string());
                }
            }
            continue;
        }

        let Some(flag) = Flag::from_keyword(keyword) else {
            return Err(DockspecError::UnknownFlag {
                flag: keyword.to_string(),
                file: origin.to_string(),
            }
            .into());
        };
        spec.push(flag, tokens.map(str::to_string));
    }

    Ok(spec)
}
