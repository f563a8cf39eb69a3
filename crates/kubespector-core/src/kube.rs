//! kubectl helpers run on the executor's node

use kubespector_exec::CommandOutput;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::executor::CommandExecutor;
use crate::templater::kubectl_error;
use crate::templates::{
    NAMESPACE_TEMPLATE, Namespace, REPLICATION_CONTROLLER_TEMPLATE, ReplicationController,
    SERVICE_TEMPLATE, Service,
};

/// Lists `name:Type=Status;…` for every node condition, one per line after
/// `tr`, keeping only the Ready ones
const READY_NODES_JSONPATH: &str =
    "\"{range .items[*]}{@.metadata.name}:{range @.status.conditions[*]}{@.type}={@.status};{end}{end}\"";

impl CommandExecutor {
    pub async fn create_namespace(&self, namespace: &str) -> Result<(), CoreError> {
        let data = Namespace {
            name: namespace.to_string(),
        };
        self.deploy_kubernetes_resource(NAMESPACE_TEMPLATE, &data)
            .await
            .map(|_| ())
    }

    /// Apply a Service manifest
    ///
    /// Returns `Ok(true)` when kubectl reports the service already exists,
    /// `Ok(false)` when it was created.
    pub async fn create_service(&self, service: &Service) -> Result<bool, CoreError> {
        match self.deploy_kubernetes_resource(SERVICE_TEMPLATE, service).await {
            Ok(_) => Ok(false),
            Err(e) => {
                let exists = e
                    .output()
                    .is_some_and(|out| out.combined().contains("AlreadyExists"));
                if exists {
                    info!(service = %service.name, "service already exists");
                    Ok(true)
                } else {
                    Err(e)
                }
            }
        }
    }

    pub async fn create_replication_controller(
        &self,
        rc: &ReplicationController,
    ) -> Result<(), CoreError> {
        self.deploy_kubernetes_resource(REPLICATION_CONTROLLER_TEMPLATE, rc)
            .await
            .map(|_| ())
    }

    /// `kubectl --namespace=<ns> delete <kind/name>`
    ///
    /// # Errors
    /// Returns `CoreError::Resource` if kubectl rejects the delete
    pub async fn remove_resource(&self, namespace: &str, name: &str) -> Result<(), CoreError> {
        let ns = format!("--namespace={namespace}");
        self.run_kubectl_command(&[ns.as_str(), "delete", name])
            .await
            .map_err(kubectl_error("delete"))?;
        Ok(())
    }

    pub async fn get_pods(&self, namespace: &str, wide: bool) -> Result<CommandOutput, CoreError> {
        let ns = format!("--namespace={namespace}");
        let mut args = vec![ns.as_str(), "get", "pods"];
        if wide {
            args.push("-o=wide");
        }
        Ok(self.run_kubectl_command(args.as_slice()).await?)
    }

    /// Count of nodes whose Ready condition is True
    ///
    /// # Errors
    /// Returns the command error, or `CoreError::Parse` if the output is not
    /// a number
    pub async fn get_number_of_ready_nodes(&self) -> Result<usize, CoreError> {
        let jsonpath = format!("jsonpath={READY_NODES_JSONPATH}");
        let args = [
            "get",
            "nodes",
            "-o",
            jsonpath.as_str(),
            "|",
            "tr",
            "';'",
            "\\\\n",
            "|",
            "grep",
            "\"Ready=True\"",
            "|",
            "wc",
            "-l",
        ];

        let output = self.run_kubectl_command(&args).await?;
        let count = output.stdout.trim().parse::<usize>().map_err(|e| {
            CoreError::Parse(format!("ready node count {:?}: {e}", output.stdout))
        })?;

        debug!(count, "ready nodes");
        Ok(count)
    }

    pub async fn scale_replication_controller(
        &self,
        namespace: &str,
        rc: &str,
        replicas: u32,
    ) -> Result<(), CoreError> {
        let ns = format!("--namespace={namespace}");
        let replicas = format!("--replicas={replicas}");
        self.run_kubectl_command(&[
            ns.as_str(),
            "scale",
            "replicationcontroller",
            rc,
            replicas.as_str(),
        ])
        .await?;
        Ok(())
    }
}
