//! Git commands against the configuration checkout.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::domain::{Result, SoeError};

/// Commit author stamped on promotion commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// A git work tree, driven through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Run `git <args>` in the work tree and return trimmed stdout.
    ///
    /// A non-zero exit becomes [`SoeError::Git`] carrying stderr.
    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(repo = %self.root.display(), ?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await
            .map_err(|e| SoeError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            let subcommand = args
                .iter()
                .find(|arg| !arg.starts_with('-') && !arg.contains('='))
                .copied()
                .unwrap_or("command");
            return Err(SoeError::Git(format!("git {subcommand} failed: {stderr}")));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn add(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.run(&["add", "--", &path]).await.map(|_| ())
    }

    /// Whether `git status --porcelain` reports nothing for `path`.
    pub async fn is_clean(&self, path: &Path) -> Result<bool> {
        let path = path.to_string_lossy();
        Ok(self
            .run(&["status", "--porcelain", "--", &path])
            .await?
            .is_empty())
    }

    /// Commit `path` as `identity`, leaving the checkout's config and any
    /// other staged paths alone.
    pub async fn commit_as(&self, identity: &Identity, path: &Path, message: &str) -> Result<()> {
        let name = format!("user.name={}", identity.name);
        let email = format!("user.email={}", identity.email);
        let path = path.to_string_lossy();
        self.run(&[
            "-c", &name, "-c", &email, "commit", "-m", message, "--", &path,
        ])
        .await
        .map(|_| ())
    }

    pub async fn head_sha(&self) -> Result<String> {
        let sha = self.run(&["rev-parse", "HEAD"]).await?;
        if sha.is_empty() {
            return Err(SoeError::Git(
                "git rev-parse HEAD returned empty output".to_string(),
            ));
        }
        Ok(sha)
    }
}
