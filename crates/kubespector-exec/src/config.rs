//! SSH configuration types, defaults and validation

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;
use crate::keys;
use crate::node::Node;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;
/// Default connection timeout (handshake and tunnel setup)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Default per-command timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);
/// Default number of handshake attempts
pub const DEFAULT_HANDSHAKE_ATTEMPTS: u32 = 10;

/// How files are moved to and from remote nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMethod {
    /// SCP protocol over an exec channel
    Scp,
    /// SFTP subsystem
    Sftp,
}

impl FromStr for TransferMethod {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scp" => Ok(Self::Scp),
            "sftp" => Ok(Self::Sftp),
            other => Err(ExecError::Config(format!(
                "ssh file transfer method ('{other}') is invalid, valid methods: sftp, scp"
            ))),
        }
    }
}

/// Credentials and tuning for one SSH hop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshConnection {
    /// Login user
    #[serde(default)]
    pub username: String,
    /// Password, also used for keyboard-interactive prompts
    #[serde(default)]
    pub password: String,
    /// Path to a private key file
    #[serde(default)]
    pub private_key: String,
    /// Offer identities from the running SSH agent
    #[serde(default)]
    pub agent_auth: bool,
    /// SSH port (0 means default)
    #[serde(default)]
    pub port: u16,
    /// Connection timeout (zero means default)
    #[serde(default, rename = "timeout_secs", with = "secs")]
    pub timeout: Duration,
    /// Per-command timeout (zero means default)
    #[serde(default, rename = "command_timeout_secs", with = "secs")]
    pub command_timeout: Duration,
    /// Handshake attempts before giving up (0 means default)
    #[serde(default)]
    pub handshake_attempts: u32,
    /// `scp` or `sftp` (empty means scp)
    #[serde(default)]
    pub file_transfer_method: String,
}

/// Jump host settings; inactive unless `node` is valid
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BastionConnection {
    /// Credentials for the bastion itself
    #[serde(flatten)]
    pub connection: SshConnection,
    /// The bastion machine
    #[serde(default)]
    pub node: Node,
}

impl BastionConnection {
    /// Whether remote channels must be tunnelled through the bastion
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.node.is_valid()
    }
}

/// Everything needed to reach any node in the cluster
///
/// `local_on` and `bastion` are mutually exclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshConfig {
    /// Credentials used for the nodes
    #[serde(default)]
    pub connection: SshConnection,
    /// The node this process runs on; commands for it use the local shell
    #[serde(default)]
    pub local_on: Node,
    /// Optional jump host
    #[serde(default)]
    pub bastion: BastionConnection,
}

impl SshConfig {
    /// Whether `node` is the machine this process runs on
    #[must_use]
    pub fn is_local(&self, node: &Node) -> bool {
        self.local_on.same_as(node)
    }

    /// Copy of the configuration with zero values replaced by defaults
    #[must_use]
    pub fn with_defaults(&self) -> SshConfig {
        let mut config = self.clone();
        let c = &mut config.connection;

        if c.port == 0 {
            c.port = DEFAULT_PORT;
        }
        if c.timeout.is_zero() {
            c.timeout = DEFAULT_TIMEOUT;
        }
        if c.command_timeout.is_zero() {
            c.command_timeout = DEFAULT_COMMAND_TIMEOUT;
        }
        if c.handshake_attempts == 0 {
            c.handshake_attempts = DEFAULT_HANDSHAKE_ATTEMPTS;
        }
        if c.file_transfer_method.is_empty() {
            c.file_transfer_method = "scp".to_string();
        }

        if config.bastion.is_enabled() {
            let private_key = config.connection.private_key.clone();
            let timeout = config.connection.timeout;
            let bc = &mut config.bastion.connection;
            if bc.port == 0 {
                bc.port = DEFAULT_PORT;
            }
            if bc.private_key.is_empty() && !private_key.is_empty() {
                bc.private_key = private_key;
            }
            if bc.timeout.is_zero() {
                bc.timeout = timeout;
            }
        }

        config
    }

    /// Check the configuration before any network activity
    ///
    /// Every problem is collected and reported in a single `ExecError::Config`.
    ///
    /// # Errors
    /// Returns `ExecError::Config` listing all problems found
    pub fn validate(&self) -> Result<(), ExecError> {
        let c = &self.connection;
        let mut errs = Vec::new();

        if c.username.is_empty() {
            errs.push(ExecError::Config(
                "an ssh username must be specified".to_string(),
            ));
        }

        if !c.private_key.is_empty()
            && let Err(e) = keys::check_private_key(Path::new(&c.private_key))
        {
            errs.push(ExecError::Config(format!(
                "ssh private key file is invalid: {e}"
            )));
        }

        if self.bastion.is_enabled() {
            let bc = &self.bastion.connection;
            if !bc.agent_auth && bc.password.is_empty() && bc.private_key.is_empty() {
                errs.push(ExecError::Config(
                    "ssh bastion password or ssh bastion private key file must be specified"
                        .to_string(),
                ));
            }
        }

        if let Err(e) = TransferMethod::from_str(&c.file_transfer_method) {
            errs.push(e);
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(ExecError::Config(ExecError::flatten(&errs)))
        }
    }

    /// Apply defaults, then validate
    ///
    /// # Errors
    /// Returns `ExecError::Config` when validation fails
    pub fn prepare(&self) -> Result<SshConfig, ExecError> {
        let config = self.with_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Transfer method of a prepared configuration
    ///
    /// # Errors
    /// Returns `ExecError::Config` for an unknown method
    pub fn transfer_method(&self) -> Result<TransferMethod, ExecError> {
        self.connection.file_transfer_method.parse()
    }
}

/// Serialize a `Duration` as whole seconds
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
