//! Local command execution using `tokio::process`

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::error::ExecError;
use crate::output::CommandOutput;
use crate::traits::RemoteExecutor;

const SHELLS: [&str; 2] = ["/bin/bash", "/bin/sh"];

/// Local command executor
///
/// Used for the node this process runs on. Commands go through
/// `/bin/bash -c`, or `/bin/sh -c` when bash is not installed.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    command_timeout: Duration,
}

impl LocalExecutor {
    /// Create a new local executor
    #[must_use]
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    /// Internal method to execute command
    #[instrument(skip(self), level = "debug")]
    async fn execute(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        let start = Instant::now();
        let shell = find_shell()?;

        debug!(shell = %shell, command = %cmd, "executing local command");

        let child = Command::new(shell)
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::Spawn(e.to_string()))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        let result = CommandOutput::from_raw(
            &output.stdout,
            &output.stderr,
            output.status.code().unwrap_or(-1),
            start.elapsed(),
        );

        debug!(
            command = %cmd,
            status = result.exit_status,
            stdout = %result.stdout,
            stderr = %result.stderr,
            duration = ?result.duration,
            "command completed"
        );

        Ok(result)
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_COMMAND_TIMEOUT)
    }
}

fn find_shell() -> Result<&'static str, ExecError> {
    SHELLS
        .into_iter()
        .find(|shell| is_executable(Path::new(shell)))
        .ok_or_else(|| ExecError::Spawn("no usable shell found (/bin/bash, /bin/sh)".to_string()))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| !m.is_dir() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

async fn same_file(src: &Path, dst: &Path) -> bool {
    match (
        tokio::fs::canonicalize(src).await,
        tokio::fs::canonicalize(dst).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn copy_file(src: &Path, dst: &Path) -> Result<(), ExecError> {
    // copying a file onto itself truncates it
    if same_file(src, dst).await {
        debug!(path = %src.display(), "source and destination are the same file");
        return Ok(());
    }

    debug!(src = %src.display(), dst = %dst.display(), "copying local file");

    tokio::fs::copy(src, dst)
        .await
        .map(|_| ())
        .map_err(|e| {
            ExecError::Transfer(format!(
                "copy {} to {}: {e}",
                src.display(),
                dst.display()
            ))
        })
}

fn directory_unsupported() -> ExecError {
    ExecError::Transfer("local directory transfer is not supported".to_string())
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        self.run_with_timeout(cmd, self.command_timeout).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandOutput, ExecError> {
        let start = Instant::now();

        match timeout(timeout_duration, self.execute(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    command = %cmd,
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    async fn upload_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ExecError> {
        copy_file(local_path, Path::new(remote_path)).await
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ExecError> {
        copy_file(Path::new(remote_path), local_path).await
    }

    async fn upload_directory(
        &self,
        _remote_path: &str,
        _local_path: &Path,
    ) -> Result<(), ExecError> {
        Err(directory_unsupported())
    }

    async fn download_directory(
        &self,
        _remote_path: &str,
        _local_path: &Path,
    ) -> Result<(), ExecError> {
        Err(directory_unsupported())
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}
