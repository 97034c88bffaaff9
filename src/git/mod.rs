//! Git operations used during staging.
//!
//! Only shallow clones are needed: a remote pip source is checked out once into
//! the staging directory and installed from there.

use anyhow::Result;
use std::path::Path;

use crate::constants::GIT_CLONE_TIMEOUT;
use crate::staging::SourceFetcher;
use crate::utils::process::{ProcessCommand, Tool};

/// Build a shallow clone of `url` into `target`, at `branch` when given.
pub fn clone_command(url: &str, branch: Option<&str>, target: &Path) -> ProcessCommand {
    let mut cmd = ProcessCommand::new(Tool::Git).args(["clone", "--depth", "1"]);
    if let Some(branch) = branch {
        cmd = cmd.args(["--branch", branch]);
    }
    cmd.arg(url)
        .arg(target.display().to_string())
        .clone_url(url)
        .env("GIT_TERMINAL_PROMPT", "0")
        .with_timeout(Some(GIT_CLONE_TIMEOUT))
}

/// [`SourceFetcher`] cloning with the host `git`.
///
/// Terminal prompts are disabled, so a repository needing credentials fails
/// fast and the caller can fall back to the alternate URL form.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitFetcher;

impl SourceFetcher for GitFetcher {
    async fn fetch(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<()> {
        tracing::info!("Cloning {url} into {}", dest.display());
        clone_command(url, branch, dest).with_context(url).execute_success().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DockspecError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_clone_local_repository() {
        if !crate::utils::command_exists("git") {
            return;
        }
        let dir = TempDir::new().unwrap();
        let origin = dir.path().join("origin");
        std::fs::create_dir_all(&origin).unwrap();
        for args in [
            vec!["init", "-q", "-b", "main"],
            vec!["-c", "user.name=t", "-c", "user.email=t@t", "commit", "-q", "--allow-empty", "-m", "init"],
        ] {
            ProcessCommand::new(Tool::Git)
                .args(args)
                .current_dir(&origin)
                .execute_success()
                .await
                .unwrap();
        }

        let url = format!("file://{}", origin.display());
        let dest = dir.path().join("clone");
        GitFetcher.fetch(&url, Some("main"), &dest).await.unwrap();
        assert!(dest.join(".git").exists());
    }

    #[tokio::test]
    async fn test_clone_failure_names_url() {
        if !crate::utils::command_exists("git") {
            return;
        }
        let dir = TempDir::new().unwrap();
        let url = format!("file://{}", dir.path().join("missing").display());
        let err = GitFetcher.fetch(&url, None, &dir.path().join("clone")).await.unwrap_err();
        match err.downcast::<DockspecError>().unwrap() {
            DockspecError::GitCloneFailed {
                url: failed,
                ..
            } => assert_eq!(failed, url),
            other => panic!("Expected GitCloneFailed, got {other:?}"),
        }
    }
}
