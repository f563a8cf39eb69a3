//! Cluster configuration: node groups and what to check on them

use kubespector_exec::{Node, SshConfig};
use serde::{Deserialize, Serialize};

/// Pseudo group selecting every configured group
pub const ALL_GROUPNAME: &str = "ALL";
/// Group holding the Kubernetes control plane
pub const MASTER_GROUPNAME: &str = "Master";

/// Filesystems and directories to report usage for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    #[serde(default)]
    pub file_system_usage: Vec<String>,
    #[serde(default)]
    pub directory_usage: Vec<String>,
}

/// Kubernetes resources to list for a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kubernetes {
    #[serde(default)]
    pub resources: Vec<KubernetesResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesResource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub wide: bool,
}

/// A named set of nodes
///
/// The same physical node may appear in several groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterGroup {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default)]
    pub certificates: Vec<String>,
    #[serde(default)]
    pub disk_usage: DiskUsage,
    #[serde(default)]
    pub kubernetes: Kubernetes,
}

/// SSH settings plus the cluster layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub cluster_groups: Vec<ClusterGroup>,
}

impl Config {
    /// Case-insensitive group lookup
    #[must_use]
    pub fn find_group_by_name(&self, name: &str) -> Option<&ClusterGroup> {
        self.cluster_groups
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case(name))
    }

    /// Names of all groups in declaration order
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        self.cluster_groups.iter().map(|g| g.name.clone()).collect()
    }

    /// First node, in any group, whose host or IP equals `name`
    #[must_use]
    pub fn find_node(&self, name: &str) -> Option<&Node> {
        self.cluster_groups
            .iter()
            .flat_map(|g| g.nodes.iter())
            .find(|n| n.matches(name))
    }
}
