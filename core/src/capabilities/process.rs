//! Subprocess capability backed by `tokio::process`.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::CommandOutput;
use super::CommandRunner;
use crate::error::RunnerError;

/// Spawns real subprocesses. Children are killed when dropped, so a
/// cancelled run never leaves strays behind.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    async fn run_inner(
        &self,
        cancel: &CancellationToken,
        cwd: &Path,
        stdin: Option<&str>,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, RunnerError> {
        debug!(program, ?args, "running command");

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: program.to_string(),
            source,
        })?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes())
                    .await
                    .map_err(|source| RunnerError::Io {
                        program: program.to_string(),
                        source,
                    })?;
                // Dropping the pipe signals EOF.
            }
        }

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
            output = child.wait_with_output() => output.map_err(|source| RunnerError::Io {
                program: program.to_string(),
                source,
            })?,
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        cancel: &CancellationToken,
        cwd: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, RunnerError> {
        self.run_inner(cancel, cwd, None, program, args).await
    }

    async fn run_with_stdin(
        &self,
        cancel: &CancellationToken,
        cwd: &Path,
        stdin: &str,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, RunnerError> {
        self.run_inner(cancel, cwd, Some(stdin), program, args).await
    }
}
