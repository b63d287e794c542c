use restarter_controller::KubeClusterClient;
use restarter_controller::Outcome;
use restarter_controller::ReconciliationKey;
use restarter_controller::Reconciler;
use restarter_controller::filter;
use restarter_controller::filter::ObservedChange;

use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap as KubeConfigMap;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher as kube_watcher;
use log;
use std::collections::HashMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;

/*
 * RestartManager wires the core to the cluster: a watcher future that
 * turns the flat ConfigMap watch stream into old/new changes for the
 * enqueue predicate, and a worker future that drains the queue through
 * the Reconciler. The single worker serializes reconciliations, so no
 * two run for the same key at once.
 */
#[derive(Clone)]
pub struct RestartManager {
    cm_api: KubeApi<KubeConfigMap>,
    reconciler: Arc<Reconciler>,
    requeue_delay: u64,
}

/*
 * The watch stream only carries the new state of an object; the filter
 * wants the previous one too. UpdateTracker keeps the last snapshot per
 * key and classifies each event as created, updated, deleted or
 * resynced. Only accepted updates yield a key to enqueue.
 */
#[derive(Default)]
struct UpdateTracker {
    seen: HashMap<ReconciliationKey, KubeConfigMap>,
    relisted: HashSet<ReconciliationKey>,
}

impl UpdateTracker {
    fn observe(&mut self, event: kube_watcher::Event<KubeConfigMap>) -> Option<ReconciliationKey> {
	match event {
	    kube_watcher::Event::Init => {
		self.relisted.clear();
		None
	    },
	    kube_watcher::Event::InitApply(cm) => {
		let key = ReconciliationKey::of(&cm)?;

		/*
		 * A re-list may carry an edit made while the watch was
		 * down: with a prior snapshot this is an update like any
		 * other. Only a key never seen before is a plain resync.
		 */
		let enqueue = match self.seen.get(&key) {
		    Some(old) => filter::should_enqueue(&ObservedChange::Updated { old, new: &cm }),
		    None => filter::should_enqueue(&ObservedChange::Resynced(&cm)),
		};
		self.relisted.insert(key.clone());
		self.seen.insert(key.clone(), cm);
		enqueue.then_some(key)
	    },
	    kube_watcher::Event::InitDone => {
		/* drop snapshots of objects that vanished while the watch was down */
		let relisted = std::mem::take(&mut self.relisted);
		self.seen.retain(|key, _| relisted.contains(key));
		None
	    },
	    kube_watcher::Event::Apply(cm) => {
		let key = ReconciliationKey::of(&cm)?;
		let enqueue = match self.seen.get(&key) {
		    Some(old) => filter::should_enqueue(&ObservedChange::Updated { old, new: &cm }),
		    None => filter::should_enqueue(&ObservedChange::Created(&cm)),
		};

		self.seen.insert(key.clone(), cm);
		enqueue.then_some(key)
	    },
	    kube_watcher::Event::Delete(cm) => {
		let key = ReconciliationKey::of(&cm)?;

		let enqueue = filter::should_enqueue(&ObservedChange::Deleted(&cm));
		self.seen.remove(&key);
		enqueue.then_some(key)
	    },
	}
    }
}

impl RestartManager {

    /*
     * watcher returns a Future that follows the ConfigMap watch and
     * pushes accepted keys onto the reconcile queue.
     */
    pub fn watcher(&self, queue: UnboundedSender<ReconciliationKey>) -> impl Future<Output = ()> {
	let mut tracker = UpdateTracker::default();

	kube_watcher(self.cm_api.clone(), kube_watcher::Config::default())
	    .default_backoff()
	    .for_each(move |event| {
		match event {
		    Ok(event) => {
			if let Some(key) = tracker.observe(event) {
			    log::debug!("enqueue reconciliation for ConfigMap {}", key);
			    if queue.send(key).is_err() {
				log::error!("reconcile queue is closed, dropping key");
			    }
			}
		    },
		    Err(err) => {
			log::warn!("configmap watch error: {}", err);
		    }
		}

		futures::future::ready(())
	    })
    }

    /*
     * worker drains the queue through the Reconciler. Transient fetch
     * faults go back on the queue with exponential backoff; restart
     * faults are logged and dropped (see Error::requeue).
     */
    pub async fn worker(&self, mut queue: UnboundedReceiver<ReconciliationKey>, requeue: UnboundedSender<ReconciliationKey>) {
	let mut attempts: HashMap<ReconciliationKey, u32> = HashMap::new();

	while let Some(key) = queue.recv().await {
	    match self.reconciler.reconcile(&key).await {
		Ok(outcome) => {
		    attempts.remove(&key);
		    if let Outcome::Restarted(restarted) = outcome {
			log::info!("reconciled ConfigMap {}, restarted {} deployment(s)", key, restarted);
		    }
		},
		Err(err) if err.requeue() => {
		    let tries = attempts.entry(key.clone()).or_insert(0);
		    *tries += 1;

		    let backoff = self.backoff(*tries);
		    log::warn!("reconcile of ConfigMap {} failed, retrying in {:?}: {}", key, backoff, err);

		    let requeue = requeue.clone();
		    tokio::spawn(async move {
			tokio::time::sleep(backoff).await;
			let _ = requeue.send(key);
		    });
		},
		Err(err) => {
		    attempts.remove(&key);
		    log::error!("reconcile of ConfigMap {} failed, not requeued: {}", key, err);
		}
	    }
	}
    }

    fn backoff(&self, tries: u32) -> Duration {
	/* base * 2^(tries-1), capped at 2^6 */
	Duration::from_secs(self.requeue_delay) * 2u32.pow((tries - 1).min(6))
    }

    pub fn new(kube_client: KubeClient, namespace: Option<&str>, requeue_delay: u64) -> Self {
	let cm_api = match namespace {
	    Some(ns) => KubeApi::namespaced(kube_client.clone(), ns),
	    None => KubeApi::all(kube_client.clone()),
	};
	let cluster = Arc::new(KubeClusterClient::new(kube_client));

	Self{
	    cm_api,
	    reconciler: Arc::new(Reconciler::new(cluster)),
	    requeue_delay,
	}
    }
}
