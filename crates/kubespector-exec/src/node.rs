//! Node addressing and identity

use std::fmt;

use serde::{Deserialize, Serialize};

/// A cluster machine, addressed by host name and/or IP
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Host name
    #[serde(default)]
    pub host: String,
    /// IP address
    #[serde(default)]
    pub ip: String,
}

impl Node {
    /// Create a node with both host and IP
    pub fn new(host: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ip: ip.into(),
        }
    }

    /// Create a node known only by host name
    pub fn from_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ip: String::new(),
        }
    }

    /// A node needs at least one of host or IP to be reachable
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !(self.host.is_empty() && self.ip.is_empty())
    }

    /// Address used for dialing: IP when present, host otherwise
    #[must_use]
    pub fn address(&self) -> &str {
        if self.ip.is_empty() {
            &self.host
        } else {
            &self.ip
        }
    }

    /// Address-based identity
    ///
    /// IPs are compared when both nodes carry one, host names otherwise.
    /// Invalid nodes never match anything.
    #[must_use]
    pub fn same_as(&self, other: &Node) -> bool {
        if !self.is_valid() || !other.is_valid() {
            return false;
        }

        if !self.ip.is_empty() && !other.ip.is_empty() {
            self.ip == other.ip
        } else if !self.host.is_empty() && !other.host.is_empty() {
            self.host == other.host
        } else {
            false
        }
    }

    /// Whether the node is the given host name or IP
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        !name.is_empty() && (self.host == name || self.ip == name)
    }

    /// Display label: `host (ip)`, or just `host`
    #[must_use]
    pub fn label(&self) -> String {
        if !self.is_valid() {
            return String::new();
        }

        if self.ip.is_empty() {
            self.host.clone()
        } else {
            format!("{} ({})", self.host, self.ip)
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
