//! Repository queries implemented over the command runner.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::CommandRunner;
use super::GitQuery;

/// Thin porcelain over `git` plumbing commands. All queries are
/// read-only; failures degrade to "unknown" rather than erroring, since a
/// validator outside a repository is a normal situation.
pub struct GitClient {
    runner: Arc<dyn CommandRunner>,
}

impl GitClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn stdout(
        &self,
        cancel: &CancellationToken,
        cwd: &Path,
        args: &[&str],
    ) -> Option<String> {
        match self.runner.run(cancel, cwd, "git", args).await {
            Ok(output) if output.success() => Some(output.stdout.trim().to_string()),
            Ok(output) => {
                debug!(?args, exit = output.exit_code, "git query failed");
                None
            }
            Err(err) => {
                debug!(?args, %err, "git query errored");
                None
            }
        }
    }

    async fn lines(
        &self,
        cancel: &CancellationToken,
        cwd: &Path,
        args: &[&str],
    ) -> Vec<PathBuf> {
        self.stdout(cancel, cwd, args)
            .await
            .map(|out| {
                out.lines()
                    .filter(|line| !line.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl GitQuery for GitClient {
    async fn is_in_repo(&self, cancel: &CancellationToken, cwd: &Path) -> bool {
        self.stdout(cancel, cwd, &["rev-parse", "--is-inside-work-tree"])
            .await
            .is_some_and(|out| out == "true")
    }

    async fn repo_root(&self, cancel: &CancellationToken, cwd: &Path) -> Option<PathBuf> {
        self.stdout(cancel, cwd, &["rev-parse", "--show-toplevel"])
            .await
            .map(PathBuf::from)
    }

    async fn current_branch(&self, cancel: &CancellationToken, cwd: &Path) -> Option<String> {
        self.stdout(cancel, cwd, &["branch", "--show-current"])
            .await
            .filter(|branch| !branch.is_empty())
    }

    async fn remote_url(
        &self,
        cancel: &CancellationToken,
        cwd: &Path,
        remote: &str,
    ) -> Option<String> {
        self.stdout(cancel, cwd, &["remote", "get-url", remote]).await
    }

    async fn remotes(&self, cancel: &CancellationToken, cwd: &Path) -> Vec<String> {
        self.stdout(cancel, cwd, &["remote"])
            .await
            .map(|out| out.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    async fn branch_remote(
        &self,
        cancel: &CancellationToken,
        cwd: &Path,
        branch: &str,
    ) -> Option<String> {
        let key = format!("branch.{branch}.remote");
        self.stdout(cancel, cwd, &["config", "--get", &key]).await
    }

    async fn staged_files(&self, cancel: &CancellationToken, cwd: &Path) -> Vec<PathBuf> {
        self.lines(cancel, cwd, &["diff", "--name-only", "--cached"]).await
    }

    async fn modified_files(&self, cancel: &CancellationToken, cwd: &Path) -> Vec<PathBuf> {
        self.lines(cancel, cwd, &["diff", "--name-only"]).await
    }

    async fn untracked_files(&self, cancel: &CancellationToken, cwd: &Path) -> Vec<PathBuf> {
        self.lines(cancel, cwd, &["ls-files", "--others", "--exclude-standard"])
            .await
    }
}
