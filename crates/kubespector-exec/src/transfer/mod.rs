//! File and directory transfer over an established session

pub mod scp;
pub mod sftp;

use std::path::Path;

use russh::client;
use russh_sftp::client::SftpSession;

use crate::config::TransferMethod;
use crate::error::ExecError;
use crate::session::{ClientHandler, Session};

/// Direction and shape of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    UploadFile,
    DownloadFile,
    UploadDirectory,
    DownloadDirectory,
}

impl Transfer {
    fn recursive(self) -> bool {
        matches!(self, Transfer::UploadDirectory | Transfer::DownloadDirectory)
    }

    fn is_upload(self) -> bool {
        matches!(self, Transfer::UploadFile | Transfer::UploadDirectory)
    }
}

/// Move a file or directory between this host and the session's node
///
/// # Errors
/// Returns `ExecError::Transfer` on any failure
pub async fn run(
    session: &Session,
    method: TransferMethod,
    transfer: Transfer,
    remote_path: &str,
    local_path: &Path,
) -> Result<(), ExecError> {
    match method {
        TransferMethod::Scp => run_scp(session.handle(), transfer, remote_path, local_path).await,
        TransferMethod::Sftp => run_sftp(session.handle(), transfer, remote_path, local_path).await,
    }
}

async fn run_scp(
    handle: &client::Handle<ClientHandler>,
    transfer: Transfer,
    remote_path: &str,
    local_path: &Path,
) -> Result<(), ExecError> {
    if transfer == Transfer::UploadDirectory {
        // the sink writes entries into an existing directory
        let mkdir = format!("mkdir -p {}", scp::shell_quote(remote_path));
        let output = Session::exec_on(handle, &mkdir).await?;
        if !output.success() {
            return Err(ExecError::Transfer(format!(
                "create remote directory {remote_path}: {}",
                output.stderr
            )));
        }
    }

    let cmd = if transfer.is_upload() {
        scp::sink_command(remote_path, transfer.recursive())
    } else {
        scp::source_command(remote_path, transfer.recursive())
    };

    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ExecError::Transfer(format!("open channel: {e}")))?;
    channel
        .exec(true, cmd)
        .await
        .map_err(|e| ExecError::Transfer(format!("start scp: {e}")))?;
    let mut stream = channel.into_stream();

    match transfer {
        Transfer::UploadFile => scp::upload_file(&mut stream, remote_path, local_path).await,
        Transfer::DownloadFile => scp::download_file(&mut stream, local_path).await,
        Transfer::UploadDirectory => scp::upload_directory(&mut stream, local_path).await,
        Transfer::DownloadDirectory => scp::download_directory(&mut stream, local_path).await,
    }
}

async fn run_sftp(
    handle: &client::Handle<ClientHandler>,
    transfer: Transfer,
    remote_path: &str,
    local_path: &Path,
) -> Result<(), ExecError> {
    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ExecError::Transfer(format!("open channel: {e}")))?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| ExecError::Transfer(format!("request sftp subsystem: {e}")))?;

    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| ExecError::Transfer(format!("start sftp session: {e}")))?;

    let result = match transfer {
        Transfer::UploadFile => sftp::upload_file(&sftp, remote_path, local_path).await,
        Transfer::DownloadFile => sftp::download_file(&sftp, remote_path, local_path).await,
        Transfer::UploadDirectory => sftp::upload_directory(&sftp, remote_path, local_path).await,
        Transfer::DownloadDirectory => {
            sftp::download_directory(&sftp, remote_path, local_path).await
        }
    };

    let _ = sftp.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_shape() {
        assert!(Transfer::UploadDirectory.recursive());
        assert!(Transfer::UploadDirectory.is_upload());
        assert!(!Transfer::DownloadFile.recursive());
        assert!(!Transfer::DownloadFile.is_upload());
    }
}
