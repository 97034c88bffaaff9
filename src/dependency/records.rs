//! Concrete dependency records and their merge rules.

use anyhow::Result;
use serde::Serialize;

use super::Mergeable;
use super::requirement::{Requirement, normalize_name};
use crate::constants::FIELD_SEPARATOR;
use crate::core::DockspecError;

/// Identity shared by singleton records (version pins, environment exports).
const SINGLETON_IDENTITY: &str = "";

/// Prefixes marking an entry as a repository URL.
const GIT_URL_PREFIXES: [&str; 4] = ["git+", "git://", "git@", "ssh://"];

/// Base image of the `FROM` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseImage {
    /// Image name, including any registry prefix
    pub image: String,
    /// Image tag
    pub tag: String,
}

impl BaseImage {
    /// Parse `image[:tag]`; a colon followed by a path (registry port) is not a tag.
    pub fn parse(token: &str) -> Result<Self> {
        let (image, tag) = match token.rsplit_once(':') {
            Some((image, tag)) if !tag.contains('/') => (image, tag),
            _ => (token, "latest"),
        };
        if image.is_empty() || tag.is_empty() {
            return Err(DockspecError::InvalidDependency {
                token: token.to_string(),
                reason: "expected '<image>:<tag>'".to_string(),
            }
            .into());
        }
        Ok(Self {
            image: image.to_string(),
            tag: tag.to_string(),
        })
    }

    /// `image:tag` as written in the `FROM` instruction.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl Mergeable for BaseImage {
    /// A chain has one base, so every `FROM` shares the same identity.
    fn identity(&self) -> &str {
        SINGLETON_IDENTITY
    }

    fn merge(&mut self, other: Self) -> Result<()> {
        Err(DockspecError::DuplicateBaseImage {
            existing: self.reference(),
            duplicate: other.reference(),
        }
        .into())
    }
}

/// Package installed with the OS package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OsPackage {
    /// Package name as declared
    pub name: String,
}

impl Mergeable for OsPackage {
    fn identity(&self) -> &str {
        &self.name
    }

    fn merge(&mut self, other: Self) -> Result<()> {
        debug_assert!(self.same_identity(&other));
        Ok(())
    }
}

/// Name of a private source host requiring credentials during pip installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivateSource {
    /// Opaque name as declared
    pub name: String,
}

impl PrivateSource {
    /// Whether the entry itself is a git fetch, named by a URL scheme rather
    /// than a bare host.
    pub fn is_remote(&self) -> bool {
        GIT_URL_PREFIXES.iter().any(|prefix| self.name.starts_with(prefix))
    }
}

impl Mergeable for PrivateSource {
    fn identity(&self) -> &str {
        &self.name
    }

    fn merge(&mut self, other: Self) -> Result<()> {
        debug_assert!(self.same_identity(&other));
        Ok(())
    }
}

/// Python module copied into the image and exposed through `PYTHONPATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathModule {
    /// Importable module name
    pub name: String,
}

impl Mergeable for PathModule {
    fn identity(&self) -> &str {
        &self.name
    }

    fn merge(&mut self, other: Self) -> Result<()> {
        debug_assert!(self.same_identity(&other));
        Ok(())
    }
}

/// Version pin for conda itself or the python runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionPin {
    /// Requested version
    pub version: String,
}

impl Mergeable for VersionPin {
    fn identity(&self) -> &str {
        SINGLETON_IDENTITY
    }

    /// The first-discovered pin (closest to the root specification) is kept.
    fn merge(&mut self, other: Self) -> Result<()> {
        if other.version != self.version {
            tracing::debug!(
                "Keeping version pin {} over {} declared further up the chain",
                self.version,
                other.version
            );
        }
        Ok(())
    }
}

/// Package installed with `conda install`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CondaPackage {
    /// Parsed requirement
    pub requirement: Requirement,
    /// Channel to install from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Solver to use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver: Option<String>,
    #[serde(skip)]
    key: String,
}

impl CondaPackage {
    /// Parse `requirement[;channel[;solver]]`.
    pub fn parse(token: &str) -> Result<Self> {
        let fields: Vec<&str> = token.split(FIELD_SEPARATOR).collect();
        if fields.len() > 3 {
            return Err(DockspecError::InvalidDependency {
                token: token.to_string(),
                reason: "expected at most '<package>;<channel>;<solver>'".to_string(),
            }
            .into());
        }
        let field = |i: usize| fields.get(i).filter(|f| !f.is_empty()).map(|f| (*f).to_string());

        let requirement = Requirement::parse(fields[0])?;
        if requirement.url.is_some() {
            return Err(DockspecError::InvalidDependency {
                token: token.to_string(),
                reason: "conda packages cannot be installed from a URL".to_string(),
            }
            .into());
        }

        Ok(Self {
            key: normalize_name(&requirement.name),
            requirement,
            channel: field(1),
            solver: field(2),
        })
    }

    /// Match spec passed to `conda install`.
    pub fn install_spec(&self) -> String {
        self.requirement.name_with_specifier()
    }
}

impl Mergeable for CondaPackage {
    fn identity(&self) -> &str {
        &self.key
    }

    fn merge(&mut self, other: Self) -> Result<()> {
        debug_assert!(self.same_identity(&other));
        self.requirement.specifier.intersect(&other.requirement.specifier);
        self.requirement.merge_extras(&other.requirement);
        // Last applied channel/solver wins
        if other.channel.is_some() {
            self.channel = other.channel;
        }
        if other.solver.is_some() {
            self.solver = other.solver;
        }
        Ok(())
    }
}

/// Package installed with `pip install`, optionally from a git repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipPackage {
    /// Parsed requirement; `url` excludes the branch suffix
    pub requirement: Requirement,
    /// Branch split off the URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Extra arguments forcing a dedicated install command
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub install_args: Vec<String>,
    /// In-image path of a staged checkout replacing the network fetch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged_path: Option<String>,
    #[serde(skip)]
    key: String,
}

impl PipPackage {
    /// Parse `requirement[;extra-arg...]`.
    ///
    /// A trailing `@segment` of the URL is a branch when the segment contains no `/`.
    pub fn parse(token: &str) -> Result<Self> {
        let mut fields = token.split(FIELD_SEPARATOR);
        let mut requirement = Requirement::parse(fields.next().unwrap_or_default())?;
        let install_args = fields.filter(|f| !f.is_empty()).map(str::to_string).collect();

        let mut branch = None;
        if let Some(url) = requirement.url.take() {
            match url.rsplit_once('@') {
                Some((repo, last)) if !last.contains('/') && !repo.is_empty() => {
                    branch = Some(last.to_string());
                    requirement.url = Some(repo.to_string());
                }
                _ => requirement.url = Some(url),
            }
        }

        Ok(Self {
            key: normalize_name(&requirement.name),
            requirement,
            branch,
            install_args,
            staged_path: None,
        })
    }

    /// Package name as declared.
    pub fn name(&self) -> &str {
        &self.requirement.name
    }

    /// Repository URL, without branch.
    pub fn url(&self) -> Option<&str> {
        self.requirement.url.as_deref()
    }

    /// Whether the package is fetched from a git repository.
    pub fn is_remote(&self) -> bool {
        self.url().is_some_and(|url| GIT_URL_PREFIXES.iter().any(|prefix| url.starts_with(prefix)))
    }

    /// Argument passed to `pip install` for this package.
    pub fn install_target(&self) -> String {
        if let Some(staged) = &self.staged_path {
            return staged.clone();
        }
        match self.url() {
            Some(url) => {
                let mut target = format!("{}@{}", self.requirement.name_with_extras(), url);
                if let Some(branch) = &self.branch {
                    target.push('@');
                    target.push_str(branch);
                }
                target
            }
            None => self.requirement.name_with_specifier(),
        }
    }
}

impl Mergeable for PipPackage {
    fn identity(&self) -> &str {
        &self.key
    }

    fn merge(&mut self, other: Self) -> Result<()> {
        debug_assert!(self.same_identity(&other));

        if let (Some(mine), Some(theirs)) = (self.url(), other.url())
            && mine != theirs
        {
            return Err(DockspecError::UrlMismatch {
                package: self.name().to_string(),
                existing: mine.to_string(),
                other: theirs.to_string(),
            }
            .into());
        }
        if self.requirement.url.is_none() {
            self.requirement.url.clone_from(&other.requirement.url);
        }

        if let (Some(mine), Some(theirs)) = (&self.branch, &other.branch)
            && mine != theirs
        {
            return Err(DockspecError::BranchMismatch {
                package: self.name().to_string(),
                existing: mine.clone(),
                other: theirs.clone(),
            }
            .into());
        }
        if self.branch.is_none() {
            self.branch.clone_from(&other.branch);
        }

        self.requirement.specifier.intersect(&other.requirement.specifier);
        self.requirement.merge_extras(&other.requirement);
        for arg in other.install_args {
            if !self.install_args.contains(&arg) {
                self.install_args.push(arg);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mismatch(result: Result<()>) -> DockspecError {
        result.unwrap_err().downcast::<DockspecError>().unwrap()
    }

    #[test]
    fn test_base_image_parse() {
        let base = BaseImage::parse("ubuntu:22.04").unwrap();
        assert_eq!(base.image, "ubuntu");
        assert_eq!(base.tag, "22.04");

        let base = BaseImage::parse("localhost:5000/tools").unwrap();
        assert_eq!(base.image, "localhost:5000/tools");
        assert_eq!(base.tag, "latest");

        assert!(BaseImage::parse(":tag").is_err());
    }

    #[test]
    fn test_base_image_merge_is_error() {
        let mut a = BaseImage::parse("ubuntu:22.04").unwrap();
        let b = BaseImage::parse("ubuntu:24.04").unwrap();
        assert!(matches!(mismatch(a.merge(b)), DockspecError::DuplicateBaseImage { .. }));
    }

    #[test]
    fn test_conda_fields() {
        let pkg = CondaPackage::parse("numpy>=1.24;conda-forge;libmamba").unwrap();
        assert_eq!(pkg.install_spec(), "numpy>=1.24");
        assert_eq!(pkg.channel.as_deref(), Some("conda-forge"));
        assert_eq!(pkg.solver.as_deref(), Some("libmamba"));

        let pkg = CondaPackage::parse("numpy;;libmamba").unwrap();
        assert!(pkg.channel.is_none());
        assert_eq!(pkg.solver.as_deref(), Some("libmamba"));

        assert!(CondaPackage::parse("a;b;c;d").is_err());
    }

    #[test]
    fn test_conda_merge_intersects_and_last_channel_wins() {
        let mut a = CondaPackage::parse("numpy>=1.20;defaults").unwrap();
        let b = CondaPackage::parse("NumPy<2;conda-forge").unwrap();
        a.merge(b).unwrap();
        assert_eq!(a.install_spec(), "numpy<2,>=1.20");
        assert_eq!(a.channel.as_deref(), Some("conda-forge"));
    }

    #[test]
    fn test_pip_branch_split() {
        let pkg = PipPackage::parse("qml2@git+https://github.com/org/qml2.git@develop").unwrap();
        assert_eq!(pkg.url(), Some("git+https://github.com/org/qml2.git"));
        assert_eq!(pkg.branch.as_deref(), Some("develop"));
        assert!(pkg.is_remote());
        assert_eq!(pkg.install_target(), "qml2@git+https://github.com/org/qml2.git@develop");

        let pkg = PipPackage::parse("qml2@git+ssh://git@github.com/org/qml2.git").unwrap();
        assert_eq!(pkg.url(), Some("git+ssh://git@github.com/org/qml2.git"));
        assert!(pkg.branch.is_none());
    }

    #[test]
    fn test_pip_install_args() {
        let pkg = PipPackage::parse("qml2;--no-build-isolation").unwrap();
        assert_eq!(pkg.install_args, vec!["--no-build-isolation"]);
        assert_eq!(pkg.install_target(), "qml2");
    }

    #[test]
    fn test_pip_branch_adoption_and_conflict() {
        let mut a = PipPackage::parse("lib@git+https://github.com/org/lib.git").unwrap();
        let b = PipPackage::parse("lib@git+https://github.com/org/lib.git@main").unwrap();
        a.merge(b).unwrap();
        assert_eq!(a.branch.as_deref(), Some("main"));

        let c = PipPackage::parse("lib@git+https://github.com/org/lib.git@dev").unwrap();
        match mismatch(a.merge(c)) {
            DockspecError::BranchMismatch {
                package,
                ..
            } => assert_eq!(package, "lib"),
            other => panic!("Expected BranchMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_pip_url_conflict() {
        let mut a = PipPackage::parse("lib@git+https://github.com/org/lib.git").unwrap();
        let b = PipPackage::parse("lib@git+https://github.com/fork/lib.git").unwrap();
        assert!(matches!(mismatch(a.merge(b)), DockspecError::UrlMismatch { .. }));
    }

    #[test]
    fn test_version_pin_keeps_first() {
        let mut a = VersionPin {
            version: "3.11".to_string(),
        };
        a.merge(VersionPin {
            version: "3.9".to_string(),
        })
        .unwrap();
        assert_eq!(a.version, "3.11");
    }
}
