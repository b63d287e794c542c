use crate::client::ClusterClient;
use crate::errors::Error;
use crate::filter;
use crate::restart;

use k8s_openapi::api::core::v1::ConfigMap as KubeConfigMap;
use log;
use std::fmt;
use std::sync::Arc;

/*
 * Identifies the ConfigMap a reconciliation is about. The work queue
 * owns these between the watch loop and the reconciler.
 */
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReconciliationKey {
    pub namespace: String,
    pub name: String,
}

impl ReconciliationKey {
    pub fn of(cm: &KubeConfigMap) -> Option<Self> {
	let namespace = cm.metadata.namespace.clone()?;
	let name = cm.metadata.name.clone()?;

	Some(Self{
	    namespace,
	    name,
	})
    }
}

impl fmt::Display for ReconciliationKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
	write!(f, "{}/{}", self.namespace, self.name)
    }
}

/* how a successful reconciliation ended */
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /* the trigger matched; this many Deployments were restarted */
    Restarted(usize),
    /* the ConfigMap exists but does not carry the trigger label */
    NoTrigger,
    /* the ConfigMap is gone, nothing to restart */
    Vanished,
}

pub struct Reconciler {
    cluster: Arc<dyn ClusterClient>,
}

impl Reconciler {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
	Self{
	    cluster,
	}
    }

    /*
     * One reconciliation: fetch the ConfigMap, check the trigger label
     * and restart its dependents. Callers decide requeueing from
     * Error::requeue(); every Ok outcome means no requeue.
     */
    pub async fn reconcile(&self, key: &ReconciliationKey) -> Result<Outcome, Error> {
	log::info!("start reconcile for ConfigMap {}", key);

	let cm = match self.cluster.get_config_map(&key.namespace, &key.name).await {
	    Ok(Some(cm)) => cm,
	    Ok(None) => {
		log::warn!("ConfigMap {} not found, nothing to restart", key);
		return Ok(Outcome::Vanished);
	    },
	    Err(source) => {
		return Err(Error::Fetch{
		    namespace: key.namespace.clone(),
		    name: key.name.clone(),
		    source,
		});
	    }
	};

	/* the watch predicate already checked this; re-check on the fresh read */
	if !filter::has_restart_label(&cm) {
	    log::debug!("ConfigMap {} lost the restart label, skipping", key);
	    return Ok(Outcome::NoTrigger);
	}

	match restart::restart_dependents(self.cluster.as_ref(), &key.namespace, &key.name).await {
	    Ok(restarted) => {
		log::info!("restart for ConfigMap {} done, {} deployment(s) restarted", key, restarted);
		Ok(Outcome::Restarted(restarted))
	    },
	    Err(err) => {
		log::error!("restart for ConfigMap {} failed, not requeued: {}", key, err);
		Err(err)
	    }
	}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::fake::FakeCluster;
    use crate::client::fake::config_map;
    use crate::client::fake::deployment;
    use crate::filter::RESTART_LABEL_KEY;
    use crate::filter::RESTART_LABEL_VALUE;

    fn key(namespace: &str, name: &str) -> ReconciliationKey {
	ReconciliationKey{
	    namespace: String::from(namespace),
	    name: String::from(name),
	}
    }

    fn labeled_cm(namespace: &str, name: &str) -> KubeConfigMap {
	config_map(namespace, name, &[(RESTART_LABEL_KEY, RESTART_LABEL_VALUE)], &[("conf", "a=1")])
    }

    #[tokio::test]
    async fn vanished_configmap_is_a_benign_skip() {
	let cluster = Arc::new(FakeCluster::default());
	cluster.insert_deployment(deployment("ns1", "web", &["cm1"]));
	let reconciler = Reconciler::new(cluster.clone());

	let outcome = reconciler.reconcile(&key("ns1", "cm1")).await.unwrap();

	assert_eq!(outcome, Outcome::Vanished);
	assert!(cluster.updated_names().is_empty());
    }

    #[tokio::test]
    async fn unlabeled_configmap_restarts_nothing() {
	let cluster = Arc::new(FakeCluster::default());
	cluster.insert_config_map(config_map("ns1", "cm1", &[], &[("conf", "a=1")]));
	cluster.insert_deployment(deployment("ns1", "web", &["cm1"]));
	let reconciler = Reconciler::new(cluster.clone());

	let outcome = reconciler.reconcile(&key("ns1", "cm1")).await.unwrap();

	assert_eq!(outcome, Outcome::NoTrigger);
	assert!(cluster.updated_names().is_empty());
    }

    #[tokio::test]
    async fn labeled_configmap_restarts_its_dependents() {
	let cluster = Arc::new(FakeCluster::default());
	cluster.insert_config_map(labeled_cm("ns1", "cm1"));
	cluster.insert_deployment(deployment("ns1", "web", &["cm1"]));
	cluster.insert_deployment(deployment("ns1", "worker", &["cm1"]));
	cluster.insert_deployment(deployment("ns1", "unrelated", &["other"]));
	let reconciler = Reconciler::new(cluster.clone());

	let outcome = reconciler.reconcile(&key("ns1", "cm1")).await.unwrap();

	assert_eq!(outcome, Outcome::Restarted(2));
	assert_eq!(cluster.updated_names(), vec!["web", "worker"]);
    }

    #[tokio::test]
    async fn fetch_fault_is_requeued() {
	let cluster = Arc::new(FakeCluster{
	    fail_get: true,
	    ..FakeCluster::default()
	});
	let reconciler = Reconciler::new(cluster);

	let err = reconciler.reconcile(&key("ns1", "cm1")).await.unwrap_err();

	assert!(matches!(err, Error::Fetch { .. }));
	assert!(err.requeue());
    }

    #[tokio::test]
    async fn restart_fault_disables_requeue() {
	let cluster = Arc::new(FakeCluster::default());
	cluster.insert_config_map(labeled_cm("ns1", "cm1"));
	cluster.insert_deployment(deployment("ns1", "web", &["cm1"]));
	cluster.fail_update_of("web", 500);
	let reconciler = Reconciler::new(cluster);

	let err = reconciler.reconcile(&key("ns1", "cm1")).await.unwrap_err();

	assert!(matches!(err, Error::Update { .. }));
	assert!(!err.requeue());
    }
}
