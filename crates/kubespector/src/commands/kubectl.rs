//! kubectl passthrough on the first reachable master

use eyre::{bail, eyre};
use kubespector_core::{Dispatcher, MASTER_GROUPNAME};
use tracing::info;

/// Run `kubectl <args>` on a master and print the result
///
/// # Errors
/// Returns error if no master is configured or reachable, or kubectl fails
pub async fn run(dispatcher: &Dispatcher, args: &[String]) -> eyre::Result<()> {
    let config = dispatcher.config();
    let masters = config
        .find_group_by_name(MASTER_GROUPNAME)
        .map(|g| g.nodes.clone())
        .unwrap_or_default();

    let Some(first) = masters.first().cloned() else {
        bail!("no host configured for group [{MASTER_GROUPNAME}]");
    };

    let node = dispatcher
        .executor_for(first)
        .first_accessible_node(&masters)
        .await
        .ok_or_else(|| eyre!("no master available"))?;

    info!(node = %node, "running kubectl");
    println!("Running kubectl command '{}' on node {node}", args.join(" "));
    println!();

    let output = dispatcher
        .executor_for(node)
        .run_kubectl_command(args)
        .await?;

    println!("{}", output.stdout);
    Ok(())
}
