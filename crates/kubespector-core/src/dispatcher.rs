//! Target resolution and sequential fan-out over cluster nodes

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use kubespector_exec::{Node, SshConfig};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ALL_GROUPNAME, Config};
use crate::error::CoreError;
use crate::executor::{CommandExecutor, DefaultExecutorFactory, ExecutorFactory};

/// What to run and where
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Command-specific argument passed through to the processor
    pub target: String,
    /// Single node (host or IP); takes precedence over `groups`
    pub node: Option<String>,
    /// Comma-separated group names; all groups when unset or `ALL`
    pub groups: Option<String>,
}

/// Caller-supplied callbacks
#[async_trait]
pub trait Processor: Send {
    /// Called once before a node (with its label) or a group (with its
    /// name) is processed; the other argument is empty
    fn initialize(&mut self, target: &str, node_label: &str, group: &str);

    /// Called once per node, with an executor bound to it
    async fn process(&mut self, executor: &CommandExecutor, target: &str)
    -> Result<(), CoreError>;
}

/// Outcome of one dispatch run
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Nodes processed, in order
    pub visited: Vec<Node>,
    /// Nodes skipped for lack of an address
    pub invalid_nodes: Vec<Node>,
    /// Requested groups that do not exist or have no nodes
    pub missing_groups: Vec<String>,
    /// Per-node processor failures: (node label, error)
    pub failures: Vec<(String, String)>,
}

impl DispatchReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Host name, or the IP for nodes configured without one
fn dedup_key(node: &Node) -> &str {
    if node.host.is_empty() {
        &node.ip
    } else {
        &node.host
    }
}

/// State owned by a single `run`
#[derive(Default)]
struct DispatchContext {
    seen: HashSet<String>,
    report: DispatchReport,
}

pub struct Dispatcher {
    config: Config,
    ssh: Arc<SshConfig>,
    factory: Arc<dyn ExecutorFactory>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("groups", &self.config.group_names())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(config: Config) -> Self {
        Self::with_factory(config, Arc::new(DefaultExecutorFactory))
    }

    pub fn with_factory(config: Config, factory: Arc<dyn ExecutorFactory>) -> Self {
        let ssh = Arc::new(config.ssh.clone());
        Self {
            config,
            ssh,
            factory,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Executor for `node` sharing this dispatcher's settings
    pub fn executor_for(&self, node: Node) -> CommandExecutor {
        CommandExecutor::new(Arc::clone(&self.ssh), node, Arc::clone(&self.factory))
    }

    /// Resolve `opts` into nodes and run `processor` on each, one at a time
    ///
    /// # Errors
    /// - `CoreError::NodeNotFound` if `opts.node` matches no configured node
    /// - `CoreError::NoNodes` if the group path visited nothing
    #[instrument(skip(self, processor))]
    pub async fn run<P>(
        &self,
        opts: &DispatchOptions,
        processor: &mut P,
    ) -> Result<DispatchReport, CoreError>
    where
        P: Processor + ?Sized,
    {
        let mut ctx = DispatchContext::default();

        if let Some(name) = opts.node.as_deref().filter(|n| !n.is_empty()) {
            let node = self
                .config
                .find_node(name)
                .filter(|n| n.is_valid())
                .cloned()
                .ok_or_else(|| CoreError::NodeNotFound(name.to_string()))?;

            processor.initialize(&opts.target, &node.label(), "");
            self.visit(&mut ctx, processor, node, &opts.target).await;
            return Ok(ctx.report);
        }

        for group_name in self.requested_groups(opts) {
            let Some(group) = self
                .config
                .find_group_by_name(&group_name)
                .filter(|g| !g.nodes.is_empty())
            else {
                error!(group = %group_name, "no nodes found for group");
                ctx.report.missing_groups.push(group_name);
                continue;
            };

            processor.initialize(&opts.target, "", &group_name);

            for node in &group.nodes {
                if !node.is_valid() {
                    warn!(group = %group_name, ?node, "node has no valid address");
                    ctx.report.invalid_nodes.push(node.clone());
                    continue;
                }
                if ctx.seen.contains(dedup_key(node)) {
                    debug!(node = %node, "already processed");
                    continue;
                }
                self.visit(&mut ctx, processor, node.clone(), &opts.target)
                    .await;
            }
        }

        if ctx.report.visited.is_empty() {
            return Err(CoreError::NoNodes);
        }

        Ok(ctx.report)
    }

    fn requested_groups(&self, opts: &DispatchOptions) -> Vec<String> {
        match opts.groups.as_deref().map(str::trim) {
            Some(groups) if !groups.is_empty() && !groups.eq_ignore_ascii_case(ALL_GROUPNAME) => {
                groups
                    .split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(ToString::to_string)
                    .collect()
            }
            _ => self.config.group_names(),
        }
    }

    async fn visit<P>(&self, ctx: &mut DispatchContext, processor: &mut P, node: Node, target: &str)
    where
        P: Processor + ?Sized,
    {
        let label = node.label();
        let executor = self.executor_for(node.clone());

        info!(node = %label, "processing node");
        if let Err(e) = processor.process(&executor, target).await {
            error!(node = %label, error = %e, "processing failed");
            ctx.report.failures.push((label, e.to_string()));
        }

        ctx.seen.insert(dedup_key(&node).to_string());
        ctx.report.visited.push(node);
    }
}
