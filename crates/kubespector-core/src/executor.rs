//! Node-bound command executor

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use kubespector_exec::{
    CommandOutput, ExecError, LocalExecutor, Node, RemoteExecutor, SshConfig, SshExecutor,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::CoreError;
use crate::templater::ResourceTemplater;

/// Factory for the transport behind a `CommandExecutor`
///
/// Called once per operation; the returned executor lives for that
/// operation only.
#[async_trait]
pub trait ExecutorFactory: Send + Sync {
    /// Create an executor that reaches `node`
    async fn create_executor(
        &self,
        ssh: &SshConfig,
        node: &Node,
    ) -> Result<Arc<dyn RemoteExecutor>, ExecError>;
}

/// Local shell for `ssh.local_on`, SSH for everything else
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExecutorFactory;

#[async_trait]
impl ExecutorFactory for DefaultExecutorFactory {
    async fn create_executor(
        &self,
        ssh: &SshConfig,
        node: &Node,
    ) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        if ssh.is_local(node) {
            let command_timeout = ssh.with_defaults().connection.command_timeout;
            return Ok(Arc::new(LocalExecutor::new(command_timeout)));
        }

        Ok(Arc::new(SshExecutor::new(ssh, node.address())?))
    }
}

/// Runs commands and transfers for one node at a time
#[derive(Clone)]
pub struct CommandExecutor {
    ssh: Arc<SshConfig>,
    node: Node,
    factory: Arc<dyn ExecutorFactory>,
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

impl CommandExecutor {
    pub fn new(ssh: Arc<SshConfig>, node: Node, factory: Arc<dyn ExecutorFactory>) -> Self {
        Self { ssh, node, factory }
    }

    /// Executor using the default local/SSH selection
    pub fn with_default_factory(ssh: Arc<SshConfig>, node: Node) -> Self {
        Self::new(ssh, node, Arc::new(DefaultExecutorFactory))
    }

    /// Same settings, bound to another node
    #[must_use]
    pub fn with_node(&self, node: Node) -> Self {
        Self {
            ssh: Arc::clone(&self.ssh),
            node,
            factory: Arc::clone(&self.factory),
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    async fn transport(&self) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        if !self.node.is_valid() {
            return Err(ExecError::Config(format!(
                "node {:?} has no valid address",
                self.node
            )));
        }
        self.factory.create_executor(&self.ssh, &self.node).await
    }

    /// Run `cmd` on the bound node
    ///
    /// # Errors
    /// Returns `ExecError::Command` on a non-zero exit status, or the
    /// transport error if the node cannot be reached
    #[instrument(skip(self), fields(node = %self.node))]
    pub async fn perform_cmd(&self, cmd: &str, sudo: bool) -> Result<CommandOutput, ExecError> {
        let cmd = if sudo {
            format!("sudo {cmd}")
        } else {
            cmd.to_string()
        };

        let transport = self.transport().await?;
        debug!(executor = transport.executor_type(), command = %cmd, "performing command");

        transport.run(&cmd).await?.into_result()
    }

    pub async fn upload_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ExecError> {
        self.transport()
            .await?
            .upload_file(remote_path, local_path)
            .await
    }

    pub async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ExecError> {
        self.transport()
            .await?
            .download_file(remote_path, local_path)
            .await
    }

    pub async fn upload_directory(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ExecError> {
        self.transport()
            .await?
            .upload_directory(remote_path, local_path)
            .await
    }

    pub async fn download_directory(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ExecError> {
        self.transport()
            .await?
            .download_directory(remote_path, local_path)
            .await
    }

    /// Remove a remote file, retrying with sudo
    ///
    /// # Errors
    /// Returns `CoreError::Cleanup` only when both attempts fail
    pub async fn delete_remote_file(&self, remote_path: &str) -> Result<(), CoreError> {
        let cmd = format!("rm -f {remote_path}");

        let first = match self.perform_cmd(&cmd, false).await {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };
        debug!(path = remote_path, error = %first, "rm failed, retrying with sudo");

        match self.perform_cmd(&cmd, true).await {
            Ok(_) => Ok(()),
            Err(second) => Err(CoreError::Cleanup {
                path: remote_path.to_string(),
                reason: ExecError::flatten(&[first, second]),
            }),
        }
    }

    /// Run `kubectl <args…>` on the bound node
    pub async fn run_kubectl_command<S: AsRef<str>>(
        &self,
        args: &[S],
    ) -> Result<CommandOutput, ExecError> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        self.perform_cmd(&format!("kubectl {}", args.join(" ")), false)
            .await
    }

    /// Render, upload and apply a manifest, see [`ResourceTemplater::deploy`]
    pub async fn deploy_kubernetes_resource<T: Serialize + Sync>(
        &self,
        template: &str,
        data: &T,
    ) -> Result<CommandOutput, CoreError> {
        ResourceTemplater::new().deploy(self, template, data).await
    }

    /// `local_on` if it is among `nodes`, otherwise the first node that
    /// answers `hostname`
    pub async fn first_accessible_node(&self, nodes: &[Node]) -> Option<Node> {
        if self.ssh.local_on.is_valid()
            && let Some(local) = nodes.iter().find(|n| self.ssh.is_local(n))
        {
            return Some(local.clone());
        }

        for node in nodes {
            match self.with_node(node.clone()).perform_cmd("hostname", false).await {
                Ok(_) => return Some(node.clone()),
                Err(e) => warn!(node = %node, error = %e, "node not accessible"),
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use kubespector_exec::SshConnection;

    use super::*;

    fn local_config(node: &Node) -> Arc<SshConfig> {
        // no username: any attempt to build an SSH transport fails validation
        Arc::new(SshConfig {
            connection: SshConnection::default(),
            local_on: node.clone(),
            ..SshConfig::default()
        })
    }

    #[tokio::test]
    async fn test_local_node_uses_local_shell() {
        let node = Node::new("localhost", "127.0.0.1");
        let executor = CommandExecutor::with_default_factory(local_config(&node), node);

        let output = executor.perform_cmd("echo local", false).await.unwrap();
        assert_eq!(output.stdout, "local");
    }

    #[tokio::test]
    async fn test_remote_node_with_bad_config_never_dials() {
        let local = Node::new("localhost", "127.0.0.1");
        let executor = CommandExecutor::with_default_factory(local_config(&local), local)
            .with_node(Node::new("remote", "10.255.255.1"));

        let err = executor.perform_cmd("true", false).await.unwrap_err();
        assert!(matches!(err, ExecError::Config(_)));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_command_error() {
        let node = Node::from_host("localhost");
        let executor = CommandExecutor::with_default_factory(local_config(&node), node);

        let err = executor
            .perform_cmd("echo 'permission denied' >&2; exit 1", false)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecError::Command { status: 1, .. }));
        assert_eq!(err.to_string(), "permission denied");
    }

    #[tokio::test]
    async fn test_invalid_node_is_rejected() {
        let executor = CommandExecutor::with_default_factory(
            Arc::new(SshConfig::default()),
            Node::default(),
        );
        let err = executor.perform_cmd("true", false).await.unwrap_err();
        assert!(matches!(err, ExecError::Config(_)));
    }

    #[tokio::test]
    async fn test_first_accessible_prefers_local_node() {
        let local = Node::new("master2", "10.0.0.2");
        let executor = CommandExecutor::with_default_factory(local_config(&local), local.clone());

        let nodes = vec![Node::new("master1", "10.0.0.1"), local.clone()];
        assert_eq!(executor.first_accessible_node(&nodes).await, Some(local));
    }
}
