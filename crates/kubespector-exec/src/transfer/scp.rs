//! SCP protocol client (`scp -t` sink / `scp -f` source) over any byte stream
//!
//! Record formats: `C<mode> <size> <name>`, `D<mode> 0 <name>`, `E`,
//! `T<mtime> 0 <atime> 0`. Every record and every file body is acknowledged
//! with a single `\0`; `\x01` (warning) and `\x02` (error) carry a message
//! line instead.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::ExecError;

const OK: u8 = 0;
const WARNING: u8 = 1;
const ERROR: u8 = 2;

fn transfer_err(e: impl std::fmt::Display) -> ExecError {
    ExecError::Transfer(e.to_string())
}

/// Command to run on the remote side for each mode
pub(crate) fn sink_command(remote_path: &str, recursive: bool) -> String {
    let flags = if recursive { "-rt" } else { "-t" };
    format!("scp {flags} {}", shell_quote(remote_path))
}

pub(crate) fn source_command(remote_path: &str, recursive: bool) -> String {
    let flags = if recursive { "-rf" } else { "-f" };
    format!("scp {flags} {}", shell_quote(remote_path))
}

/// Single-quote a path for the remote shell
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

async fn read_ack<S: AsyncRead + Unpin>(stream: &mut S) -> Result<(), ExecError> {
    let code = stream.read_u8().await.map_err(transfer_err)?;
    match code {
        OK => Ok(()),
        WARNING | ERROR => {
            let msg = read_line(stream).await?;
            Err(ExecError::Transfer(format!("scp: {}", msg.trim())))
        }
        other => Err(ExecError::Transfer(format!(
            "scp: unexpected response byte {other:#04x}"
        ))),
    }
}

async fn send_ok<S: AsyncWrite + Unpin>(stream: &mut S) -> Result<(), ExecError> {
    stream.write_all(&[OK]).await.map_err(transfer_err)?;
    stream.flush().await.map_err(transfer_err)
}

async fn read_line<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String, ExecError> {
    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await.map_err(transfer_err)?;
        if byte == b'\n' {
            break;
        }
        line.push(byte);
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

#[cfg(unix)]
async fn file_mode(path: &Path) -> Result<u32, ExecError> {
    use std::os::unix::fs::PermissionsExt;

    let meta = fs::metadata(path).await.map_err(transfer_err)?;
    Ok(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
async fn file_mode(path: &Path) -> Result<u32, ExecError> {
    let meta = fs::metadata(path).await.map_err(transfer_err)?;
    Ok(if meta.is_dir() { 0o755 } else { 0o644 })
}

fn base_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// Send one file record and its body, `name` being the remote file name
async fn send_file<S>(stream: &mut S, local_path: &Path, name: &str) -> Result<(), ExecError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mode = file_mode(local_path).await?;
    let mut file = File::open(local_path).await.map_err(transfer_err)?;
    let size = file.metadata().await.map_err(transfer_err)?.len();

    trace!(file = %local_path.display(), size, "scp send file");

    stream
        .write_all(format!("C{mode:04o} {size} {name}\n").as_bytes())
        .await
        .map_err(transfer_err)?;
    read_ack(stream).await?;

    let copied = tokio::io::copy(&mut (&mut file).take(size), stream)
        .await
        .map_err(transfer_err)?;
    if copied != size {
        return Err(ExecError::Transfer(format!(
            "{} changed size during upload",
            local_path.display()
        )));
    }

    send_ok(stream).await?;
    read_ack(stream).await
}

/// Send the entries of `dir`, descending into subdirectories
fn send_entries<'a, S>(
    stream: &'a mut S,
    dir: &'a Path,
) -> Pin<Box<dyn Future<Output = Result<(), ExecError>> + Send + 'a>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await.map_err(transfer_err)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(transfer_err)? {
            paths.push(entry.path());
        }
        paths.sort();

        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if path.is_dir() {
                let mode = file_mode(&path).await?;
                stream
                    .write_all(format!("D{mode:04o} 0 {name}\n").as_bytes())
                    .await
                    .map_err(transfer_err)?;
                read_ack(stream).await?;

                send_entries(stream, &path).await?;

                stream.write_all(b"E\n").await.map_err(transfer_err)?;
                read_ack(stream).await?;
            } else {
                send_file(stream, &path, &name).await?;
            }
        }

        Ok(())
    })
}

/// Upload one file to a remote `scp -t` sink
///
/// # Errors
/// Returns `ExecError::Transfer` on any local I/O or protocol failure
pub async fn upload_file<S>(stream: &mut S, remote_path: &str, local_path: &Path) -> Result<(), ExecError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    read_ack(stream).await?;
    send_file(stream, local_path, base_name(remote_path)).await?;
    stream.shutdown().await.map_err(transfer_err)
}

/// Upload the contents of `local_dir` to a remote `scp -rt` sink
///
/// # Errors
/// Returns `ExecError::Transfer` on any local I/O or protocol failure
pub async fn upload_directory<S>(stream: &mut S, local_dir: &Path) -> Result<(), ExecError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if !local_dir.is_dir() {
        return Err(ExecError::Transfer(format!(
            "local directory does not exist: {}",
            local_dir.display()
        )));
    }

    read_ack(stream).await?;
    send_entries(stream, local_dir).await?;
    stream.shutdown().await.map_err(transfer_err)
}

struct FileHeader {
    mode: u32,
    size: u64,
    name: String,
}

fn parse_header(line: &str) -> Result<FileHeader, ExecError> {
    let invalid = || ExecError::Transfer(format!("scp: invalid header {line:?}"));

    let mut parts = line.get(1..).ok_or_else(invalid)?.splitn(3, ' ');
    let mode = parts
        .next()
        .and_then(|m| u32::from_str_radix(m, 8).ok())
        .ok_or_else(invalid)?;
    let size = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)?;
    let name = parts.next().map(str::trim).ok_or_else(invalid)?;

    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(ExecError::Transfer(format!("scp: unsafe file name {name:?}")));
    }

    Ok(FileHeader {
        mode: mode & 0o777,
        size,
        name: name.to_string(),
    })
}

async fn receive_body<S>(stream: &mut S, header: &FileHeader, dest: &Path) -> Result<(), ExecError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    trace!(file = %dest.display(), size = header.size, "scp receive file");

    let mut file = File::create(dest).await.map_err(transfer_err)?;
    let copied = tokio::io::copy(&mut (&mut *stream).take(header.size), &mut file)
        .await
        .map_err(transfer_err)?;
    file.flush().await.map_err(transfer_err)?;

    if copied != header.size {
        return Err(ExecError::Transfer(format!(
            "scp: short read for {} ({copied} of {} bytes)",
            header.name, header.size
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dest, std::fs::Permissions::from_mode(header.mode))
            .await
            .map_err(transfer_err)?;
    }

    read_ack(stream).await?;
    send_ok(stream).await
}

async fn next_record<S>(stream: &mut S) -> Result<Option<String>, ExecError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut first = [0u8; 1];
    let n = stream.read(&mut first).await.map_err(transfer_err)?;
    if n == 0 {
        return Ok(None);
    }

    match first[0] {
        WARNING | ERROR => {
            let msg = read_line(stream).await?;
            Err(ExecError::Transfer(format!("scp: {}", msg.trim())))
        }
        byte => {
            let rest = read_line(stream).await?;
            Ok(Some(format!("{}{rest}", byte as char)))
        }
    }
}

/// Download one file from a remote `scp -f` source
///
/// # Errors
/// Returns `ExecError::Transfer` on any local I/O or protocol failure
pub async fn download_file<S>(stream: &mut S, local_path: &Path) -> Result<(), ExecError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    send_ok(stream).await?;

    loop {
        let Some(line) = next_record(stream).await? else {
            return Err(ExecError::Transfer(
                "scp: connection closed before file was sent".to_string(),
            ));
        };

        match line.as_bytes().first() {
            Some(b'T') => send_ok(stream).await?,
            Some(b'C') => {
                let header = parse_header(&line)?;
                send_ok(stream).await?;
                receive_body(stream, &header, local_path).await?;
                return Ok(());
            }
            _ => {
                return Err(ExecError::Transfer(format!(
                    "scp: unexpected record {line:?}"
                )));
            }
        }
    }
}

/// Download a remote directory from an `scp -rf` source into `local_dir`
///
/// The remote directory itself maps onto `local_dir`; its entries land
/// directly inside it.
///
/// # Errors
/// Returns `ExecError::Transfer` on any local I/O or protocol failure
pub async fn download_directory<S>(stream: &mut S, local_dir: &Path) -> Result<(), ExecError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    send_ok(stream).await?;

    let mut stack: Vec<PathBuf> = Vec::new();

    while let Some(line) = next_record(stream).await? {
        match line.as_bytes().first() {
            Some(b'T') => send_ok(stream).await?,
            Some(b'D') => {
                let header = parse_header(&line)?;
                let dir = match stack.last() {
                    Some(parent) => parent.join(&header.name),
                    None => local_dir.to_path_buf(),
                };
                fs::create_dir_all(&dir).await.map_err(transfer_err)?;
                debug!(dir = %dir.display(), "scp entered directory");
                stack.push(dir);
                send_ok(stream).await?;
            }
            Some(b'E') => {
                stack.pop();
                send_ok(stream).await?;
                if stack.is_empty() {
                    break;
                }
            }
            Some(b'C') => {
                let header = parse_header(&line)?;
                let parent = stack.last().cloned().unwrap_or_else(|| local_dir.to_path_buf());
                fs::create_dir_all(&parent).await.map_err(transfer_err)?;
                send_ok(stream).await?;
                receive_body(stream, &header, &parent.join(&header.name)).await?;
            }
            _ => {
                return Err(ExecError::Transfer(format!(
                    "scp: unexpected record {line:?}"
                )));
            }
        }
    }

    Ok(())
}
