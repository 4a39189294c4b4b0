//! Entry point of the machine provider: wires the hot-swappable client
//! gateway and the driver, then waits for the shutdown signal. The
//! lifecycle callbacks themselves are invoked by the machine-controller
//! runtime through the `Driver` trait.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use machine_provider::driver::{Driver, MetalDriver};
use machine_provider::node_name::NodeNamePolicy;
use metal_client::ClientProvider;

#[derive(Parser, Debug)]
#[command(
    name = "machine-provider",
    about = "Machine lifecycle provider for ironcore metal clusters"
)]
struct Args {
    /// Path to the metal cluster kubeconfig.
    #[arg(long = "metal-kubeconfig")]
    metal_kubeconfig: PathBuf,

    /// Source of the Kubernetes node name: ServerClaimName, ServerName or BMCName.
    #[arg(long = "node-name-policy", default_value_t = NodeNamePolicy::ServerClaimName)]
    node_name_policy: NodeNamePolicy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let (client_provider, namespace) = ClientProvider::from_kubeconfig(&args.metal_kubeconfig)
        .await
        .context("failed to set up the metal cluster client")?;
    let _reload = client_provider.spawn_reload_task();

    // Handed to the machine-controller runtime; kept alive until shutdown.
    let _driver: Arc<dyn Driver> = Arc::new(MetalDriver::new(
        client_provider,
        namespace.clone(),
        args.node_name_policy,
    ));
    info!(
        "machine provider ready in namespace {namespace:?} (node name policy {})",
        args.node_name_policy
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for the shutdown signal")?;
    info!("shutdown signal received, exiting");
    Ok(())
}
