//! Command processors run by the dispatcher

pub mod kubectl;
pub mod logs;
pub mod scp;

use async_trait::async_trait;
use kubespector_core::{CommandExecutor, CoreError, Processor};

pub use logs::{LogOptions, LogType};
pub use scp::{Direction, ScpProcessor};

/// Print the banner shown before a node or group is processed
pub(crate) fn print_header(action: &str, node_label: &str, group: &str) {
    if !group.is_empty() {
        println!("===== {action} in group [{group}] =====");
    }
    if !node_label.is_empty() {
        println!("===== {action} on node {node_label} =====");
    }
    println!();
}

/// Runs one shell command per node and prints its stdout
pub struct ShellProcessor {
    action: String,
    sudo: bool,
    build: Box<dyn Fn(&str) -> String + Send + Sync>,
}

impl ShellProcessor {
    pub fn new(
        action: impl Into<String>,
        sudo: bool,
        build: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            action: action.into(),
            sudo,
            build: Box::new(build),
        }
    }

    /// `bash -c '<command>'`
    pub fn exec(sudo: bool) -> Self {
        Self::new("Executing command", sudo, |cmd| {
            format!("bash -c '{}'", cmd.replace('\'', r"'\''"))
        })
    }

    /// `systemctl <verb> <service>` under sudo
    pub fn systemctl(verb: &'static str, action: &str) -> Self {
        Self::new(action, true, move |service| match verb {
            "status" => format!("systemctl status {service} -l"),
            _ => format!("systemctl {verb} {service}"),
        })
    }

    pub fn logs(options: LogOptions, sudo: bool) -> Self {
        let action = format!("Retrieving {} logs", options.kind);
        Self::new(action, sudo, move |element| options.command(element))
    }

    pub fn command_for(&self, target: &str) -> String {
        (self.build)(target)
    }
}

#[async_trait]
impl Processor for ShellProcessor {
    fn initialize(&mut self, target: &str, node_label: &str, group: &str) {
        print_header(&format!("{} '{target}'", self.action), node_label, group);
    }

    async fn process(&mut self, executor: &CommandExecutor, target: &str) -> Result<(), CoreError> {
        let cmd = self.command_for(target);
        let result = executor.perform_cmd(&cmd, self.sudo).await;

        println!("Result on node {}:", executor.node());
        match result {
            Ok(output) => {
                println!("{}", output.stdout);
                println!();
                Ok(())
            }
            Err(e) => {
                println!("Error: {e}");
                println!();
                Err(e.into())
            }
        }
    }
}
