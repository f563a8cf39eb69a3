//! kubespector-exec: command execution on cluster nodes
//!
//! Runs shell commands and copies files either through the local shell or
//! over SSH (direct or through a bastion), behind the [`RemoteExecutor`]
//! trait.

pub mod config;
pub mod connection;
pub mod error;
pub mod keys;
pub mod local;
pub mod node;
pub mod output;
pub mod session;
pub mod ssh;
pub mod traits;
pub mod transfer;

pub use config::{BastionConnection, SshConfig, SshConnection, TransferMethod};
pub use connection::ConnectionManager;
pub use error::ExecError;
pub use local::LocalExecutor;
pub use node::Node;
pub use output::CommandOutput;
pub use ssh::SshExecutor;
pub use traits::RemoteExecutor;
