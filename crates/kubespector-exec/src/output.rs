//! Result types for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Result of one command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// stdout, trailing whitespace trimmed
    pub stdout: String,
    /// stderr, trailing whitespace trimmed
    pub stderr: String,
    /// Exit status code (0 for success)
    pub exit_status: i32,
    /// Time taken to execute
    #[serde(default)]
    pub duration: Duration,
}

impl CommandOutput {
    /// Build an output from raw captured bytes
    #[must_use]
    pub fn from_raw(stdout: &[u8], stderr: &[u8], exit_status: i32, duration: Duration) -> Self {
        Self {
            stdout: String::from_utf8_lossy(stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(stderr).trim_end().to_string(),
            exit_status,
            duration,
        }
    }

    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// `Stdout: …\nStderr: …` rendering of both streams
    #[must_use]
    pub fn combined(&self) -> String {
        format!("Stdout: {}\nStderr: {}", self.stdout, self.stderr)
    }

    /// Turn a non-zero exit status into `ExecError::Command`
    ///
    /// # Errors
    /// Returns `ExecError::Command` carrying both streams when the command failed
    pub fn into_result(self) -> Result<Self, ExecError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ExecError::Command {
                status: self.exit_status,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_trims_trailing_whitespace() {
        let out = CommandOutput::from_raw(b"  hello\n\n", b"warn \n", 0, Duration::ZERO);
        assert_eq!(out.stdout, "  hello");
        assert_eq!(out.stderr, "warn");
        assert!(out.success());
    }

    #[test]
    fn test_into_result_failure() {
        let out = CommandOutput::from_raw(b"", b"permission denied\n", 1, Duration::ZERO);
        let err = out.into_result().unwrap_err();

        assert!(matches!(err, ExecError::Command { status: 1, .. }));
        assert_eq!(err.to_string(), "permission denied");
    }

    #[test]
    fn test_combined() {
        let out = CommandOutput {
            stdout: "a".to_string(),
            stderr: "b".to_string(),
            ..CommandOutput::default()
        };
        assert_eq!(out.combined(), "Stdout: a\nStderr: b");
    }
}
