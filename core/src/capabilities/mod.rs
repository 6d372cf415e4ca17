//! Capability interfaces consumed by validators.
//!
//! Validators never touch the outside world directly: subprocesses go
//! through [`CommandRunner`], tool discovery through [`ToolChecker`],
//! scratch files through [`TempFileManager`], and repository queries
//! through [`GitQuery`]. The [`Capabilities`] record bundles the four and
//! is injected at construction - these are the seams the test suite
//! replaces with fakes.

mod git;
mod process;
mod temp;
mod tools;

use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;

pub use git::GitClient;
pub use process::ProcessRunner;
pub use temp::TempFiles;
pub use tools::SystemToolChecker;

/// Captured output of a finished subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands with cancellation support.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        cancel: &CancellationToken,
        cwd: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, RunnerError>;

    async fn run_with_stdin(
        &self,
        cancel: &CancellationToken,
        cwd: &Path,
        stdin: &str,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, RunnerError>;
}

/// Locates external tools on the host.
pub trait ToolChecker: Send + Sync {
    fn is_available(&self, name: &str) -> bool;

    /// First available tool among `preferred` then `fallbacks`.
    fn find_tool(&self, preferred: &str, fallbacks: &[&str]) -> Option<String> {
        if self.is_available(preferred) {
            return Some(preferred.to_string());
        }
        fallbacks
            .iter()
            .find(|name| self.is_available(name))
            .map(|name| name.to_string())
    }
}

/// Scratch file whose backing storage is released on drop, on every path.
pub struct ScratchFile {
    path: PathBuf,
    _guard: tempfile::NamedTempFile,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Creates exclusively-named scratch files for tools that only accept
/// paths.
pub trait TempFileManager: Send + Sync {
    fn create(&self, prefix: &str, suffix: &str, content: &str) -> Result<ScratchFile, io::Error>;
}

/// Read-only queries against the repository containing `cwd`.
#[async_trait]
pub trait GitQuery: Send + Sync {
    async fn is_in_repo(&self, cancel: &CancellationToken, cwd: &Path) -> bool;
    async fn repo_root(&self, cancel: &CancellationToken, cwd: &Path) -> Option<PathBuf>;
    async fn current_branch(&self, cancel: &CancellationToken, cwd: &Path) -> Option<String>;
    async fn remote_url(&self, cancel: &CancellationToken, cwd: &Path, remote: &str) -> Option<String>;
    async fn remotes(&self, cancel: &CancellationToken, cwd: &Path) -> Vec<String>;
    async fn branch_remote(&self, cancel: &CancellationToken, cwd: &Path, branch: &str) -> Option<String>;
    async fn staged_files(&self, cancel: &CancellationToken, cwd: &Path) -> Vec<PathBuf>;
    async fn modified_files(&self, cancel: &CancellationToken, cwd: &Path) -> Vec<PathBuf>;
    async fn untracked_files(&self, cancel: &CancellationToken, cwd: &Path) -> Vec<PathBuf>;
}

/// The capability set handed to every validator.
#[derive(Clone)]
pub struct Capabilities {
    pub runner: Arc<dyn CommandRunner>,
    pub tools: Arc<dyn ToolChecker>,
    pub temp: Arc<dyn TempFileManager>,
    pub git: Arc<dyn GitQuery>,
}

impl Capabilities {
    /// Production wiring: real subprocesses, PATH lookup, tempfiles, git.
    pub fn system() -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
        Self {
            git: Arc::new(GitClient::new(Arc::clone(&runner))),
            runner,
            tools: Arc::new(SystemToolChecker),
            temp: Arc::new(TempFiles),
        }
    }
}
