//! SSH command execution using russh crate

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::config::{SshConfig, TransferMethod};
use crate::connection::ConnectionManager;
use crate::error::ExecError;
use crate::output::CommandOutput;
use crate::session::Session;
use crate::traits::RemoteExecutor;
use crate::transfer::{self, Transfer};

/// SSH command executor
///
/// Every operation dials, authenticates, does its work and disconnects.
/// No session outlives a single call.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    manager: ConnectionManager,
    address: String,
    method: TransferMethod,
}

impl SshExecutor {
    /// Create an executor for the node at `address`
    ///
    /// # Errors
    /// Returns `ExecError::Config` if the SSH configuration is invalid
    pub fn new(config: &SshConfig, address: impl Into<String>) -> Result<Self, ExecError> {
        Self::with_manager(ConnectionManager::new(config)?, address)
    }

    /// Create an executor sharing an already prepared connection manager
    ///
    /// # Errors
    /// Returns `ExecError::Config` if the transfer method is unknown
    pub fn with_manager(
        manager: ConnectionManager,
        address: impl Into<String>,
    ) -> Result<Self, ExecError> {
        let method = manager.config().transfer_method()?;
        Ok(Self {
            manager,
            address: address.into(),
            method,
        })
    }

    /// Address commands are sent to
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn open(&self) -> Result<Session, ExecError> {
        self.manager.connect(&self.address).await
    }

    async fn transfer(
        &self,
        kind: Transfer,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ExecError> {
        debug!(
            address = %self.address,
            ?kind,
            method = ?self.method,
            remote = remote_path,
            local = %local_path.display(),
            "file transfer"
        );

        let session = self.open().await?;
        let result = transfer::run(&session, self.method, kind, remote_path, local_path).await;
        session.close().await;

        result.map_err(|e| match e {
            ExecError::Transfer(_) => e,
            other => ExecError::Transfer(other.to_string()),
        })
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        let command_timeout = self.manager.config().connection.command_timeout;
        self.run_with_timeout(cmd, command_timeout).await
    }

    #[instrument(skip(self), fields(address = %self.address))]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandOutput, ExecError> {
        let session = self.open().await?;
        let start = Instant::now();

        let result = timeout(timeout_duration, session.exec(cmd)).await;
        session.close().await;

        match result {
            Ok(Ok(output)) => {
                debug!(
                    command = %cmd,
                    status = output.exit_status,
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    duration = ?output.duration,
                    "command completed"
                );
                Ok(output)
            }
            Ok(Err(e)) => Err(e),
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
        self.transfer(Transfer::UploadFile, remote_path, local_path)
            .await
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ExecError> {
        self.transfer(Transfer::DownloadFile, remote_path, local_path)
            .await
    }

    async fn upload_directory(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ExecError> {
        self.transfer(Transfer::UploadDirectory, remote_path, local_path)
            .await
    }

    async fn download_directory(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ExecError> {
        self.transfer(Transfer::DownloadDirectory, remote_path, local_path)
            .await
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}
