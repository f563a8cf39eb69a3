//! kubespector
//!
//! Runs commands, copies files and queries Kubernetes across the nodes of a
//! cluster over SSH.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use eyre::bail;
use kubespector_core::{DispatchOptions, DispatchReport, Dispatcher, Processor};

mod commands;
mod config;
mod logging;

use commands::{Direction, LogOptions, LogType, ScpProcessor, ShellProcessor};
use config::Config;

#[derive(Parser)]
#[command(name = "kubespector")]
#[command(about = "Inspect and operate Kubernetes cluster nodes over SSH", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: $KUBESPECTOR_CONFIG, ./kubespector.toml, ...)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Which nodes to run on
#[derive(Args, Debug, Clone, Default)]
struct TargetArgs {
    /// Single node, by host name or IP
    #[arg(short, long)]
    node: Option<String>,

    /// Comma-separated groups (default: all)
    #[arg(short, long)]
    group: Option<String>,

    /// Prefix commands with sudo
    #[arg(long)]
    sudo: bool,
}

impl TargetArgs {
    fn options(&self, target: impl Into<String>) -> DispatchOptions {
        DispatchOptions {
            target: target.into(),
            node: self.node.clone(),
            groups: self.group.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a shell command
    Exec {
        command: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show the status of a systemd service
    Status {
        service: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Restart a systemd service
    Restart {
        service: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Stop a systemd service
    Stop {
        service: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Fetch logs of a service, container or pod
    Logs {
        element: String,
        #[arg(short = 't', long = "type", value_enum, default_value_t = LogType::Service)]
        kind: LogType,
        /// e.g. "1h" or "2024-01-01 00:00:00"
        #[arg(long)]
        since: Option<String>,
        /// Number of trailing lines
        #[arg(long, default_value_t = 0)]
        tail: usize,
        /// Passed through to the log command
        #[arg(last = true)]
        extra: Vec<String>,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Copy files between this machine and nodes
    Scp {
        #[arg(value_enum)]
        direction: Direction,
        #[arg(short, long)]
        local: PathBuf,
        #[arg(short, long)]
        remote: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Run kubectl on the first reachable master
    Kubectl {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
}

async fn dispatch<P: Processor>(
    dispatcher: &Dispatcher,
    opts: DispatchOptions,
    mut processor: P,
) -> Result<()> {
    let report = dispatcher.run(&opts, &mut processor).await?;
    summarize(&report)
}

fn summarize(report: &DispatchReport) -> Result<()> {
    for group in &report.missing_groups {
        eprintln!("No nodes found for group: {group}");
    }
    for node in &report.invalid_nodes {
        eprintln!("Node {node:?} has no valid address");
    }

    if !report.is_success() {
        for (node, error) in &report.failures {
            eprintln!("{node}: {error}");
        }
        bail!(
            "{} of {} node(s) failed",
            report.failures.len(),
            report.visited.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = Config::load_default(cli.config.as_deref())?;
    logging::init(&config.log_level, cli.verbose, config.log_json);

    let dispatcher = Dispatcher::new(config.cluster);

    match cli.command {
        Commands::Exec { command, target } => {
            let processor = ShellProcessor::exec(target.sudo);
            dispatch(&dispatcher, target.options(command), processor).await
        }
        Commands::Status { service, target } => {
            let processor = ShellProcessor::systemctl("status", "Checking status of service");
            dispatch(&dispatcher, target.options(service), processor).await
        }
        Commands::Restart { service, target } => {
            let processor = ShellProcessor::systemctl("restart", "Restarting service");
            dispatch(&dispatcher, target.options(service), processor).await
        }
        Commands::Stop { service, target } => {
            let processor = ShellProcessor::systemctl("stop", "Stopping service");
            dispatch(&dispatcher, target.options(service), processor).await
        }
        Commands::Logs {
            element,
            kind,
            since,
            tail,
            extra,
            target,
        } => {
            let options = LogOptions {
                kind,
                since,
                tail,
                extra_args: extra,
            };
            let processor = ShellProcessor::logs(options, target.sudo);
            dispatch(&dispatcher, target.options(element), processor).await
        }
        Commands::Scp {
            direction,
            local,
            remote,
            target,
        } => {
            let processor = ScpProcessor {
                direction,
                local,
                remote,
            };
            dispatch(&dispatcher, target.options(""), processor).await
        }
        Commands::Kubectl { args } => commands::kubectl::run(&dispatcher, &args).await,
    }
}
