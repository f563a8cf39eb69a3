//! Core error types for kubespector-core

use kubespector_exec::{CommandOutput, ExecError};
use thiserror::Error;

/// Errors raised above the transport layer
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Command or transfer failure from the executor
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Manifest template failed to render
    #[error("template error: {0}")]
    Template(String),

    /// kubectl rejected a resource
    #[error("kubernetes resource error: {message}")]
    Resource {
        /// Error reported by kubectl
        message: String,
        /// Full output of the failed command
        output: CommandOutput,
    },

    /// Both attempts to remove a remote file failed
    #[error("failed to delete remote file {path}: {reason}")]
    Cleanup {
        /// Remote path
        path: String,
        /// Flattened errors of each attempt
        reason: String,
    },

    /// Unexpected output from a query command
    #[error("unexpected command output: {0}")]
    Parse(String),

    /// No configured node matches the requested name
    #[error("no node found for {0} in config")]
    NodeNotFound(String),

    /// Group dispatch visited no node at all
    #[error("no nodes to process")]
    NoNodes,
}

impl CoreError {
    /// Output of the failed command, if this error carries one
    #[must_use]
    pub fn output(&self) -> Option<CommandOutput> {
        match self {
            CoreError::Resource { output, .. } => Some(output.clone()),
            CoreError::Exec(ExecError::Command {
                status,
                stdout,
                stderr,
            }) => Some(CommandOutput {
                stdout: stdout.clone(),
                stderr: stderr.clone(),
                exit_status: *status,
                ..CommandOutput::default()
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_from_command_error() {
        let err = CoreError::from(ExecError::Command {
            status: 1,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
        });

        let output = err.output().unwrap();
        assert_eq!(output.exit_status, 1);
        assert_eq!(output.combined(), "Stdout: out\nStderr: err");
    }

    #[test]
    fn test_no_output_for_dispatch_errors() {
        assert!(CoreError::NoNodes.output().is_none());
        assert_eq!(
            CoreError::NodeNotFound("x".to_string()).to_string(),
            "no node found for x in config"
        );
    }
}
