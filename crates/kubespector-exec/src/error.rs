//! Error types for kubespector-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while reaching a node or running work on it
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// SSH or bastion configuration is unusable; no connection was attempted
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failed to reach the node (TCP dial, tunnel or handshake)
    #[error("connection failed: {0}")]
    Connection(String),

    /// The node rejected every offered credential
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Command exited with a non-zero status
    ///
    /// Displays as the trimmed stderr, or the exit status when stderr is empty.
    #[error("{}", command_message(*status, stderr))]
    Command {
        /// Exit status code
        status: i32,
        /// Captured stdout
        stdout: String,
        /// Captured stderr
        stderr: String,
    },

    /// Upload or download failed
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// I/O error on an established channel
    #[error("I/O error: {0}")]
    Io(String),
}

fn command_message(status: i32, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exit status {status}")
    } else {
        stderr.to_string()
    }
}

impl ExecError {
    /// Whether the error text points at a rejected credential
    ///
    /// The handshake loop only has error strings to go on, so this matches
    /// on the message the same way for every error kind.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ExecError::Authentication(_)) || self.to_string().contains("authenticate")
    }

    /// Combine several errors into one, one bullet per error
    #[must_use]
    pub fn flatten(errors: &[ExecError]) -> String {
        let points: Vec<String> = errors.iter().map(|e| format!("- {e}")).collect();
        format!(
            "{} error(s) occurred:\n{}",
            errors.len(),
            points.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_shows_stderr() {
        let err = ExecError::Command {
            status: 1,
            stdout: String::new(),
            stderr: "permission denied\n".to_string(),
        };
        assert_eq!(err.to_string(), "permission denied");
    }

    #[test]
    fn test_command_error_falls_back_to_status() {
        let err = ExecError::Command {
            status: 127,
            stdout: "partial".to_string(),
            stderr: "  ".to_string(),
        };
        assert_eq!(err.to_string(), "exit status 127");
    }

    #[test]
    fn test_flatten() {
        let msg = ExecError::flatten(&[
            ExecError::Config("an ssh username must be specified".to_string()),
            ExecError::Transfer("boom".to_string()),
        ]);
        assert!(msg.starts_with("2 error(s) occurred:\n"));
        assert!(msg.contains("- invalid configuration: an ssh username must be specified"));
        assert!(msg.contains("- transfer failed: boom"));
    }

    #[test]
    fn test_auth_failure_detection() {
        assert!(ExecError::Authentication("publickey".to_string()).is_auth_failure());
        assert!(
            ExecError::Connection("unable to authenticate, no supported methods".to_string())
                .is_auth_failure()
        );
        assert!(!ExecError::Connection("connection refused".to_string()).is_auth_failure());
    }
}
