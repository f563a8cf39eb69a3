//! Executor trait shared by the local shell and SSH transports

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::output::CommandOutput;

/// Runs commands and moves files on one node
///
/// A non-zero exit status is reported through `CommandOutput::exit_status`,
/// not as an error; callers decide what a failed command means.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a shell command
    async fn run(&self, cmd: &str) -> Result<CommandOutput, ExecError>;

    /// Run a shell command, giving up after `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecError>;

    /// Copy a local file to `remote_path`
    async fn upload_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ExecError>;

    /// Copy `remote_path` to a local file
    async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ExecError>;

    /// Copy a local directory tree to `remote_path`
    async fn upload_directory(&self, remote_path: &str, local_path: &Path)
    -> Result<(), ExecError>;

    /// Copy a remote directory tree to `local_path`
    async fn download_directory(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ExecError>;

    /// Short name for logs
    fn executor_type(&self) -> &'static str;
}
