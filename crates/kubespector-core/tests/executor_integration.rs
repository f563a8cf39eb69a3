use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use kubespector_core::templates::{NAMESPACE_TEMPLATE, Service, ServicePort};
use kubespector_core::*;
use kubespector_exec::{CommandOutput, ExecError, Node, RemoteExecutor, SshConfig};

type Responder = dyn Fn(&str, &str) -> CommandOutput + Send + Sync;

// Mock implementations
struct MockExecutor {
    host: String,
    calls: Arc<Mutex<Vec<String>>>,
    uploads: Arc<Mutex<Vec<(String, String)>>>,
    respond: Arc<Responder>,
    fail_uploads: bool,
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}: {cmd}", self.host));
        Ok((self.respond)(&self.host, cmd))
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, ExecError> {
        self.run(cmd).await
    }

    async fn upload_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ExecError> {
        let content = std::fs::read_to_string(local_path)
            .map_err(|e| ExecError::Transfer(e.to_string()))?;
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}: upload {remote_path}", self.host));
        if self.fail_uploads {
            return Err(ExecError::Transfer("sftp: permission denied".to_string()));
        }
        self.uploads
            .lock()
            .unwrap()
            .push((local_path.display().to_string(), content));
        Ok(())
    }

    async fn download_file(&self, _remote_path: &str, _local_path: &Path) -> Result<(), ExecError> {
        Ok(())
    }

    async fn upload_directory(
        &self,
        _remote_path: &str,
        _local_path: &Path,
    ) -> Result<(), ExecError> {
        Ok(())
    }

    async fn download_directory(
        &self,
        _remote_path: &str,
        _local_path: &Path,
    ) -> Result<(), ExecError> {
        Ok(())
    }

    fn executor_type(&self) -> &'static str {
        "mock"
    }
}

#[derive(Clone)]
struct MockFactory {
    calls: Arc<Mutex<Vec<String>>>,
    uploads: Arc<Mutex<Vec<(String, String)>>>,
    respond: Arc<Responder>,
    fail_uploads: bool,
}

impl MockFactory {
    fn new(respond: impl Fn(&str, &str) -> CommandOutput + Send + Sync + 'static) -> Self {
        Self {
            calls: Arc::default(),
            uploads: Arc::default(),
            respond: Arc::new(respond),
            fail_uploads: false,
        }
    }

    fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutorFactory for MockFactory {
    async fn create_executor(
        &self,
        _ssh: &SshConfig,
        node: &Node,
    ) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        Ok(Arc::new(MockExecutor {
            host: node.host.clone(),
            calls: Arc::clone(&self.calls),
            uploads: Arc::clone(&self.uploads),
            respond: Arc::clone(&self.respond),
            fail_uploads: self.fail_uploads,
        }))
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        ..CommandOutput::default()
    }
}

fn failed(status: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        stderr: stderr.to_string(),
        exit_status: status,
        ..CommandOutput::default()
    }
}

fn executor(factory: &MockFactory, host: &str) -> CommandExecutor {
    CommandExecutor::new(
        Arc::new(SshConfig::default()),
        Node::from_host(host),
        Arc::new(factory.clone()),
    )
}

fn service() -> Service {
    Service {
        name: "netperf-w2".to_string(),
        namespace: "netperf".to_string(),
        ports: vec![ServicePort {
            name: "netperf-w2".to_string(),
            protocol: "TCP".to_string(),
            port: 5201,
            target_port: 5201,
        }],
    }
}

#[tokio::test]
async fn test_remote_failure_carries_stderr() {
    let factory = MockFactory::new(|_, _| failed(1, "permission denied\n"));
    let err = executor(&factory, "host1")
        .perform_cmd("cat /etc/shadow", false)
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Command { status: 1, .. }));
    assert_eq!(err.to_string(), "permission denied");
}

#[tokio::test]
async fn test_sudo_prefix() {
    let factory = MockFactory::new(|_, _| ok(""));
    executor(&factory, "host1")
        .perform_cmd("systemctl restart kubelet", true)
        .await
        .unwrap();

    assert_eq!(factory.calls(), vec!["host1: sudo systemctl restart kubelet"]);
}

#[tokio::test]
async fn test_deploy_uploads_applies_and_cleans_up() {
    let factory = MockFactory::new(|_, _| ok("namespace/netperf created"));
    let output = executor(&factory, "master1")
        .deploy_kubernetes_resource(NAMESPACE_TEMPLATE, &serde_json::json!({"name": "netperf"}))
        .await
        .unwrap();
    assert_eq!(output.stdout, "namespace/netperf created");

    let calls = factory.calls();
    assert_eq!(calls.len(), 3);
    let remote = calls[0].strip_prefix("master1: upload ").unwrap();
    assert!(remote.starts_with("/tmp/kubespector-"));
    assert_eq!(calls[1], format!("master1: kubectl apply -f {remote}"));
    assert_eq!(calls[2], format!("master1: rm -f {remote}"));

    let uploads = factory.uploads.lock().unwrap().clone();
    let (local, content) = &uploads[0];
    assert!(content.contains("kind: Namespace"));
    assert!(content.contains("name: netperf"));
    assert!(!Path::new(local).exists(), "staged file must be removed");
}

#[tokio::test]
async fn test_deploy_cleans_up_after_failed_apply() {
    let factory = MockFactory::new(|_, cmd| {
        if cmd.starts_with("kubectl apply") {
            failed(1, "error: unable to recognize")
        } else {
            ok("")
        }
    });

    let err = executor(&factory, "master1")
        .create_namespace("netperf")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Resource { .. }));
    assert!(factory.calls().last().unwrap().contains("rm -f /tmp/kubespector-"));
}

#[tokio::test]
async fn test_deploy_cleans_up_after_failed_upload() {
    let factory = MockFactory::new(|_, _| ok("")).failing_uploads();
    let err = executor(&factory, "master1")
        .create_namespace("netperf")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Exec(ExecError::Transfer(_))));

    let calls = factory.calls();
    assert_eq!(calls.len(), 2);
    let remote = calls[0].strip_prefix("master1: upload ").unwrap();
    assert!(remote.starts_with("/tmp/kubespector-"));
    assert_eq!(calls[1], format!("master1: rm -f {remote}"));
}

/// Real local transport, with `kubectl apply -f` swapped for `cat`
struct CatApply {
    inner: Arc<dyn RemoteExecutor>,
}

#[async_trait]
impl RemoteExecutor for CatApply {
    async fn run(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        match cmd.strip_prefix("kubectl apply -f ") {
            Some(path) => self.inner.run(&format!("cat {path}")).await,
            None => self.inner.run(cmd).await,
        }
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, ExecError> {
        self.run(cmd).await
    }

    async fn upload_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ExecError> {
        self.inner.upload_file(remote_path, local_path).await
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ExecError> {
        self.inner.download_file(remote_path, local_path).await
    }

    async fn upload_directory(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ExecError> {
        self.inner.upload_directory(remote_path, local_path).await
    }

    async fn download_directory(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ExecError> {
        self.inner.download_directory(remote_path, local_path).await
    }

    fn executor_type(&self) -> &'static str {
        self.inner.executor_type()
    }
}

struct CatApplyFactory;

#[async_trait]
impl ExecutorFactory for CatApplyFactory {
    async fn create_executor(
        &self,
        ssh: &SshConfig,
        node: &Node,
    ) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        let inner = DefaultExecutorFactory.create_executor(ssh, node).await?;
        Ok(Arc::new(CatApply { inner }))
    }
}

#[tokio::test]
async fn test_deploy_on_local_node_applies_full_manifest() {
    let local = Node::new("localhost", "127.0.0.1");
    let ssh = Arc::new(SshConfig {
        local_on: local.clone(),
        ..SshConfig::default()
    });
    let executor = CommandExecutor::new(ssh, local, Arc::new(CatApplyFactory));

    let output = executor
        .deploy_kubernetes_resource(NAMESPACE_TEMPLATE, &serde_json::json!({"name": "netperf"}))
        .await
        .unwrap();

    assert!(output.stdout.contains("kind: Namespace"));
    assert!(output.stdout.contains("name: netperf"));
}

#[tokio::test]
async fn test_render_failure_touches_nothing() {
    let factory = MockFactory::new(|_, _| ok(""));
    let err = executor(&factory, "master1")
        .deploy_kubernetes_resource(NAMESPACE_TEMPLATE, &serde_json::json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Template(_)));
    assert!(factory.calls().is_empty());
}

#[tokio::test]
async fn test_create_service_already_exists() {
    let factory = MockFactory::new(|_, cmd| {
        if cmd.starts_with("kubectl apply") {
            failed(
                1,
                "Error from server (AlreadyExists): services \"netperf-w2\" already exists",
            )
        } else {
            ok("")
        }
    });

    let existed = executor(&factory, "master1")
        .create_service(&service())
        .await
        .unwrap();
    assert!(existed);
}

#[tokio::test]
async fn test_create_service_other_failure() {
    let factory = MockFactory::new(|_, cmd| {
        if cmd.starts_with("kubectl apply") {
            failed(1, "The connection to the server was refused")
        } else {
            ok("")
        }
    });

    let err = executor(&factory, "master1")
        .create_service(&service())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Resource { .. }));
}

#[tokio::test]
async fn test_create_service_new() {
    let factory = MockFactory::new(|_, _| ok("service/netperf-w2 created"));
    let existed = executor(&factory, "master1")
        .create_service(&service())
        .await
        .unwrap();
    assert!(!existed);
}

#[tokio::test]
async fn test_ready_nodes_count() {
    let factory = MockFactory::new(|_, _| ok("3\n"));
    let count = executor(&factory, "master1")
        .get_number_of_ready_nodes()
        .await
        .unwrap();

    assert_eq!(count, 3);
    let call = &factory.calls()[0];
    assert!(call.contains("kubectl get nodes -o jsonpath="));
    assert!(call.ends_with("| grep \"Ready=True\" | wc -l"));
}

#[tokio::test]
async fn test_ready_nodes_unparsable() {
    let factory = MockFactory::new(|_, _| ok("No resources found"));
    let err = executor(&factory, "master1")
        .get_number_of_ready_nodes()
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Parse(_)));
}

#[tokio::test]
async fn test_ready_nodes_command_failure() {
    let factory = MockFactory::new(|_, _| failed(127, "kubectl: command not found"));
    let err = executor(&factory, "master1")
        .get_number_of_ready_nodes()
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Exec(ExecError::Command { status: 127, .. })));
}

#[tokio::test]
async fn test_delete_falls_back_to_sudo() {
    let factory = MockFactory::new(|_, cmd| {
        if cmd.starts_with("sudo") {
            ok("")
        } else {
            failed(1, "Operation not permitted")
        }
    });

    executor(&factory, "host1")
        .delete_remote_file("/tmp/x")
        .await
        .unwrap();
    assert_eq!(
        factory.calls(),
        vec!["host1: rm -f /tmp/x", "host1: sudo rm -f /tmp/x"]
    );
}

#[tokio::test]
async fn test_delete_reports_both_failures() {
    let factory = MockFactory::new(|_, _| failed(1, "read-only file system"));
    let err = executor(&factory, "host1")
        .delete_remote_file("/tmp/x")
        .await
        .unwrap_err();

    match err {
        CoreError::Cleanup { path, reason } => {
            assert_eq!(path, "/tmp/x");
            assert!(reason.starts_with("2 error(s) occurred:"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_kubectl_argument_shapes() {
    let factory = MockFactory::new(|_, _| ok(""));
    let executor = executor(&factory, "master1");

    executor.get_pods("kube-system", true).await.unwrap();
    executor.remove_resource("netperf", "rc/orchestrator").await.unwrap();
    executor
        .scale_replication_controller("netperf", "worker", 3)
        .await
        .unwrap();

    assert_eq!(
        factory.calls(),
        vec![
            "master1: kubectl --namespace=kube-system get pods -o=wide",
            "master1: kubectl --namespace=netperf delete rc/orchestrator",
            "master1: kubectl --namespace=netperf scale replicationcontroller worker --replicas=3",
        ]
    );
}

#[tokio::test]
async fn test_failed_delete_is_resource_error() {
    let factory = MockFactory::new(|_, _| {
        failed(1, "Error from server (NotFound): replicationcontrollers \"orchestrator\" not found")
    });
    let err = executor(&factory, "master1")
        .remove_resource("netperf", "rc/orchestrator")
        .await
        .unwrap_err();

    match err {
        CoreError::Resource { message, output } => {
            assert!(message.contains("NotFound"));
            assert_eq!(output.exit_status, 1);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_first_accessible_node_skips_unreachable() {
    let factory = MockFactory::new(|host, _| {
        if host == "master1" {
            failed(255, "connection refused")
        } else {
            ok(host)
        }
    });

    let nodes = vec![Node::from_host("master1"), Node::from_host("master2")];
    let node = executor(&factory, "master1")
        .first_accessible_node(&nodes)
        .await;

    assert_eq!(node, Some(Node::from_host("master2")));
}

struct HostnameProcessor {
    seen: Vec<String>,
}

#[async_trait]
impl Processor for HostnameProcessor {
    fn initialize(&mut self, _target: &str, _node_label: &str, _group: &str) {}

    async fn process(&mut self, executor: &CommandExecutor, _target: &str) -> Result<(), CoreError> {
        let output = executor.perform_cmd("hostname", false).await?;
        self.seen.push(output.stdout);
        Ok(())
    }
}

#[tokio::test]
async fn test_dispatch_binds_executor_to_each_node() {
    let factory = MockFactory::new(|host, _| ok(host));
    let config = Config {
        cluster_groups: vec![
            ClusterGroup {
                name: "Master".to_string(),
                nodes: vec![Node::from_host("host1"), Node::from_host("host2")],
                ..ClusterGroup::default()
            },
            ClusterGroup {
                name: "Etcd".to_string(),
                nodes: vec![Node::from_host("host2"), Node::from_host("host3")],
                ..ClusterGroup::default()
            },
        ],
        ..Config::default()
    };
    let dispatcher = Dispatcher::with_factory(config, Arc::new(factory.clone()));

    let mut processor = HostnameProcessor { seen: Vec::new() };
    let report = dispatcher
        .run(&DispatchOptions::default(), &mut processor)
        .await
        .unwrap();

    assert_eq!(processor.seen, vec!["host1", "host2", "host3"]);
    assert!(report.is_success());

    let mut processor = HostnameProcessor { seen: Vec::new() };
    let opts = DispatchOptions {
        node: Some("host1".to_string()),
        ..DispatchOptions::default()
    };
    dispatcher.run(&opts, &mut processor).await.unwrap();
    assert_eq!(processor.seen, vec!["host1"]);
}

#[tokio::test]
async fn test_dispatch_records_processor_failures() {
    let factory = MockFactory::new(|host, _| {
        if host == "host2" {
            failed(1, "unit kubelet not found")
        } else {
            ok(host)
        }
    });
    let config = Config {
        cluster_groups: vec![ClusterGroup {
            name: "Worker".to_string(),
            nodes: vec![Node::from_host("host1"), Node::from_host("host2")],
            ..ClusterGroup::default()
        }],
        ..Config::default()
    };
    let dispatcher = Dispatcher::with_factory(config, Arc::new(factory));

    let mut processor = HostnameProcessor { seen: Vec::new() };
    let report = dispatcher
        .run(&DispatchOptions::default(), &mut processor)
        .await
        .unwrap();

    assert_eq!(report.visited.len(), 2);
    assert_eq!(
        report.failures,
        vec![("host2".to_string(), "unit kubelet not found".to_string())]
    );
}
