mod manager;
use manager::RestartManager;

use clap::Parser;
use kube::Client as KubeClient;
use kube::runtime::watcher as kube_watcher;
use log;
use tokio::sync::mpsc;

/*
 * Manager for the configmap restart controller: watches ConfigMaps and,
 * when one carrying the restart label has its data edited, rolls every
 * Deployment in the same namespace that mounts it as a volume.
 */
#[derive(Parser)]
#[command(name = "restartm", about = "restart Deployments when a labeled ConfigMap's data changes")]
struct Args {
    /// watch a single namespace instead of the whole cluster
    #[arg(long)]
    namespace: Option<String>,

    /// base delay in seconds before a failed fetch is retried
    #[arg(long, default_value_t = 10)]
    requeue_delay: u64,
}

#[tokio::main]
async fn main() -> Result<(), kube_watcher::Error> {
    env_logger::init();
    let args = Args::parse();

    let kube_client = KubeClient::try_default().await.unwrap();
    let mgr = RestartManager::new(kube_client, args.namespace.as_deref(), args.requeue_delay);

    let (queue_tx, queue_rx) = mpsc::unbounded_channel();

    log::info!("starting configmap restart manager");
    tokio::select! {
	_ = mgr.watcher(queue_tx.clone()) => {},
	_ = mgr.worker(queue_rx, queue_tx) => {},

	// handle CTRL^C as gracefully as we can.
	_ = tokio::signal::ctrl_c() => {},
    }
    Ok(())
}
