//! SFTP transfers using russh-sftp

use std::path::{Path, PathBuf};

use russh_sftp::client::SftpSession;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::error::ExecError;

fn transfer_err(e: impl std::fmt::Display) -> ExecError {
    ExecError::Transfer(e.to_string())
}

pub(crate) fn join_remote(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

pub async fn upload_file(sftp: &SftpSession, remote_path: &str, local_path: &Path) -> Result<(), ExecError> {
    trace!(local = %local_path.display(), remote = remote_path, "sftp upload");

    let mut local = File::open(local_path).await.map_err(transfer_err)?;
    let mut remote = sftp
        .create(remote_path)
        .await
        .map_err(|e| ExecError::Transfer(format!("create {remote_path}: {e}")))?;

    tokio::io::copy(&mut local, &mut remote)
        .await
        .map_err(transfer_err)?;
    remote.shutdown().await.map_err(transfer_err)
}

pub async fn download_file(sftp: &SftpSession, remote_path: &str, local_path: &Path) -> Result<(), ExecError> {
    trace!(local = %local_path.display(), remote = remote_path, "sftp download");

    let mut remote = sftp
        .open(remote_path)
        .await
        .map_err(|e| ExecError::Transfer(format!("open {remote_path}: {e}")))?;

    let mut local = File::create(local_path).await.map_err(transfer_err)?;
    tokio::io::copy(&mut remote, &mut local)
        .await
        .map_err(transfer_err)?;
    local.flush().await.map_err(transfer_err)
}

async fn ensure_remote_dir(sftp: &SftpSession, remote_path: &str) -> Result<(), ExecError> {
    let exists = sftp.try_exists(remote_path).await.map_err(transfer_err)?;
    if !exists {
        sftp.create_dir(remote_path)
            .await
            .map_err(|e| ExecError::Transfer(format!("mkdir {remote_path}: {e}")))?;
    }
    Ok(())
}

/// Upload the contents of `local_dir` into `remote_dir`, creating it if needed
pub async fn upload_directory(
    sftp: &SftpSession,
    remote_dir: &str,
    local_dir: &Path,
) -> Result<(), ExecError> {
    if !local_dir.is_dir() {
        return Err(ExecError::Transfer(format!(
            "local directory does not exist: {}",
            local_dir.display()
        )));
    }

    let mut pending: Vec<(PathBuf, String)> = vec![(local_dir.to_path_buf(), remote_dir.to_string())];

    while let Some((local, remote)) = pending.pop() {
        ensure_remote_dir(sftp, &remote).await?;
        debug!(remote = %remote, "sftp upload directory");

        let mut entries = fs::read_dir(&local).await.map_err(transfer_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(transfer_err)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let target = join_remote(&remote, &name);
            let file_type = entry.file_type().await.map_err(transfer_err)?;

            if file_type.is_dir() {
                pending.push((entry.path(), target));
            } else {
                upload_file(sftp, &target, &entry.path()).await?;
            }
        }
    }

    Ok(())
}

/// Download the contents of `remote_dir` into `local_dir`, creating it if needed
pub async fn download_directory(
    sftp: &SftpSession,
    remote_dir: &str,
    local_dir: &Path,
) -> Result<(), ExecError> {
    let mut pending: Vec<(String, PathBuf)> = vec![(remote_dir.to_string(), local_dir.to_path_buf())];

    while let Some((remote, local)) = pending.pop() {
        fs::create_dir_all(&local).await.map_err(transfer_err)?;
        debug!(remote = %remote, "sftp download directory");

        let entries = sftp
            .read_dir(remote.as_str())
            .await
            .map_err(|e| ExecError::Transfer(format!("read_dir {remote}: {e}")))?;

        for entry in entries {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let source = join_remote(&remote, &name);

            if entry.file_type().is_dir() {
                pending.push((source, local.join(&name)));
            } else {
                download_file(sftp, &source, &local.join(&name)).await?;
            }
        }
    }

    Ok(())
}
