//! kubespector-core: cluster model, node-bound executor and fan-out
//!
//! Resolves CLI targets into cluster nodes, binds a [`CommandExecutor`] to
//! each one, and provides the kubectl and manifest helpers built on it.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod kube;
pub mod templater;
pub mod templates;

pub use config::{
    ALL_GROUPNAME, ClusterGroup, Config, DiskUsage, Kubernetes, KubernetesResource,
    MASTER_GROUPNAME,
};
pub use dispatcher::{DispatchOptions, DispatchReport, Dispatcher, Processor};
pub use error::CoreError;
pub use executor::{CommandExecutor, DefaultExecutorFactory, ExecutorFactory};
pub use templater::ResourceTemplater;
