//! Private key and agent credential loading

use std::path::Path;
use std::sync::Arc;

use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKey, load_secret_key};
use tracing::{debug, warn};

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("unable to parse key {path}: {reason}")]
    Invalid { path: String, reason: String },

    #[error("SSH_AUTH_SOCK is not set")]
    AgentNotSet,

    #[error("cannot connect to SSH agent: {0}")]
    Agent(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check that a private key exists and parses
///
/// # Errors
/// Returns `KeyError` if the file is missing or not a usable key
pub fn check_private_key(path: &Path) -> Result<(), KeyError> {
    load_private_key(path).map(|_| ())
}

/// Load an unencrypted private key from disk
///
/// # Errors
/// Returns `KeyError` if the file is missing or not a usable key
pub fn load_private_key(path: &Path) -> Result<Arc<PrivateKey>, KeyError> {
    if !path.exists() {
        return Err(KeyError::NotFound(path.display().to_string()));
    }

    warn_on_open_permissions(path)?;

    let key = load_secret_key(path, None).map_err(|e| KeyError::Invalid {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    debug!(path = %path.display(), "loaded private key");
    Ok(Arc::new(key))
}

/// Connect to the agent named by `SSH_AUTH_SOCK`
///
/// # Errors
/// Returns `KeyError::AgentNotSet` or `KeyError::Agent` when no agent is reachable
#[cfg(unix)]
pub async fn connect_agent() -> Result<AgentClient<tokio::net::UnixStream>, KeyError> {
    if std::env::var_os("SSH_AUTH_SOCK").is_none_or(|s| s.is_empty()) {
        return Err(KeyError::AgentNotSet);
    }

    AgentClient::connect_env()
        .await
        .map_err(|e| KeyError::Agent(e.to_string()))
}

#[cfg(unix)]
fn warn_on_open_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();

    // group/other bits set
    if mode & 0o77 != 0 {
        warn!(
            path = %path.display(),
            mode = format!("{:o}", mode & 0o777),
            "private key permissions are too open (should be 600)"
        );
    }

    Ok(())
}

#[cfg(not(unix))]
fn warn_on_open_permissions(_path: &Path) -> Result<(), KeyError> {
    Ok(())
}
