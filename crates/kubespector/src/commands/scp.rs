//! File and directory copy between this machine and cluster nodes

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clap::ValueEnum;
use kubespector_core::{CommandExecutor, CoreError, Processor};
use kubespector_exec::ExecError;

use super::print_header;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    #[value(alias = "u")]
    Up,
    #[value(alias = "d")]
    Down,
}

/// What a path currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Dir,
    File,
    Missing,
}

impl PathKind {
    fn parse(probe_output: &str) -> Self {
        match probe_output.trim() {
            "dir" => PathKind::Dir,
            "file" => PathKind::File,
            _ => PathKind::Missing,
        }
    }

    fn of_local(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => PathKind::Dir,
            Ok(meta) if meta.is_file() => PathKind::File,
            _ => PathKind::Missing,
        }
    }
}

/// A resolved transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPlan {
    UploadFile { remote: String, local: PathBuf },
    UploadDirectory { remote: String, local: PathBuf },
    DownloadFile { remote: String, local: PathBuf },
    DownloadDirectory { remote: String, local: PathBuf },
}

fn base_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

fn join_remote(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}

/// Work out the transfer from the direction and what both paths are
///
/// Copying into an existing directory keeps the source's name, as `cp`
/// does. Overwriting an existing file is refused.
pub fn plan(
    direction: Direction,
    local: &Path,
    local_kind: PathKind,
    remote: &str,
    remote_kind: PathKind,
) -> Result<TransferPlan, String> {
    match direction {
        Direction::Up => {
            let name = local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = match remote_kind {
                PathKind::Dir => join_remote(remote, &name),
                PathKind::Missing => remote.to_string(),
                PathKind::File => {
                    return Err(format!(
                        "can not upload {} to existing remote file {remote}, choose a remote directory or a new file name",
                        local.display()
                    ));
                }
            };

            match local_kind {
                PathKind::Dir => Ok(TransferPlan::UploadDirectory {
                    remote: target,
                    local: local.to_path_buf(),
                }),
                PathKind::File => Ok(TransferPlan::UploadFile {
                    remote: target,
                    local: local.to_path_buf(),
                }),
                PathKind::Missing => Err(format!("local path {} does not exist", local.display())),
            }
        }
        Direction::Down => {
            let target = match local_kind {
                PathKind::Dir => local.join(base_name(remote)),
                PathKind::Missing => local.to_path_buf(),
                PathKind::File => {
                    return Err(format!(
                        "can not download {remote} to existing local file {}",
                        local.display()
                    ));
                }
            };

            match remote_kind {
                PathKind::Dir => Ok(TransferPlan::DownloadDirectory {
                    remote: remote.to_string(),
                    local: target,
                }),
                PathKind::File => Ok(TransferPlan::DownloadFile {
                    remote: remote.to_string(),
                    local: target,
                }),
                PathKind::Missing => Err(format!("remote path {remote} does not exist")),
            }
        }
    }
}

/// Shell snippet printing `dir`, `file` or `none` for `path`
fn probe_command(path: &str) -> String {
    format!(
        "if [ -d '{path}' ] ; then echo dir ; elif [ -f '{path}' ] ; then echo file ; else echo none ; fi"
    )
}

pub struct ScpProcessor {
    pub direction: Direction,
    pub local: PathBuf,
    pub remote: String,
}

impl ScpProcessor {
    async fn transfer(&self, executor: &CommandExecutor) -> Result<TransferPlan, CoreError> {
        let probe = executor.perform_cmd(&probe_command(&self.remote), false).await?;
        let remote_kind = PathKind::parse(&probe.stdout);
        let local_kind = PathKind::of_local(&self.local);

        let plan = plan(
            self.direction,
            &self.local,
            local_kind,
            &self.remote,
            remote_kind,
        )
        .map_err(ExecError::Transfer)?;

        match &plan {
            TransferPlan::UploadFile { remote, local } => {
                executor.upload_file(remote, local).await?;
            }
            TransferPlan::UploadDirectory { remote, local } => {
                executor.upload_directory(remote, local).await?;
            }
            TransferPlan::DownloadFile { remote, local } => {
                executor.download_file(remote, local).await?;
            }
            TransferPlan::DownloadDirectory { remote, local } => {
                executor.download_directory(remote, local).await?;
            }
        }

        Ok(plan)
    }
}

#[async_trait]
impl Processor for ScpProcessor {
    fn initialize(&mut self, _target: &str, node_label: &str, group: &str) {
        print_header("Executing scp", node_label, group);
    }

    async fn process(&mut self, executor: &CommandExecutor, _target: &str) -> Result<(), CoreError> {
        let arrow = match self.direction {
            Direction::Up => "->",
            Direction::Down => "<-",
        };
        let result = self.transfer(executor).await;

        println!("Result on node {}:", executor.node());
        match result {
            Ok(_) => {
                println!("Scp {} {arrow} {} finished", self.local.display(), self.remote);
                println!();
                Ok(())
            }
            Err(e) => {
                println!("Scp {} {arrow} {} failed: {e}", self.local.display(), self.remote);
                println!();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_file_into_remote_dir_keeps_name() {
        let plan = plan(
            Direction::Up,
            Path::new("/home/me/kubeconfig"),
            PathKind::File,
            "/etc/kubernetes/",
            PathKind::Dir,
        )
        .unwrap();

        assert_eq!(
            plan,
            TransferPlan::UploadFile {
                remote: "/etc/kubernetes/kubeconfig".to_string(),
                local: PathBuf::from("/home/me/kubeconfig"),
            }
        );
    }

    #[test]
    fn test_upload_refuses_to_overwrite() {
        let err = plan(
            Direction::Up,
            Path::new("a.txt"),
            PathKind::File,
            "/tmp/a.txt",
            PathKind::File,
        )
        .unwrap_err();
        assert!(err.contains("existing remote file"));
    }

    #[test]
    fn test_download_dir_to_new_local_path() {
        let plan = plan(
            Direction::Down,
            Path::new("./logs"),
            PathKind::Missing,
            "/var/log/pods",
            PathKind::Dir,
        )
        .unwrap();

        assert_eq!(
            plan,
            TransferPlan::DownloadDirectory {
                remote: "/var/log/pods".to_string(),
                local: PathBuf::from("./logs"),
            }
        );
    }

    #[test]
    fn test_download_file_into_local_dir() {
        let plan = plan(
            Direction::Down,
            Path::new("/backup"),
            PathKind::Dir,
            "/var/lib/etcd/snapshot.db",
            PathKind::File,
        )
        .unwrap();

        assert!(matches!(
            plan,
            TransferPlan::DownloadFile { ref local, .. } if local == Path::new("/backup/snapshot.db")
        ));
    }

    #[test]
    fn test_download_missing_remote() {
        assert!(plan(
            Direction::Down,
            Path::new("/backup"),
            PathKind::Dir,
            "/nope",
            PathKind::Missing,
        )
        .is_err());
    }

    #[test]
    fn test_probe_output() {
        assert_eq!(PathKind::parse("dir\n"), PathKind::Dir);
        assert_eq!(PathKind::parse("file"), PathKind::File);
        assert_eq!(PathKind::parse("none"), PathKind::Missing);
    }
}
