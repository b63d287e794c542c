use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {

    /* the ConfigMap fetch at the start of a reconciliation failed */
    #[error("get ConfigMap {namespace}/{name}: {source}")]
    Fetch {
	namespace: String,
	name: String,
	#[source]
	source: kube::Error,
    },

    /* listing the candidate Deployments failed, nothing was restarted */
    #[error("list Deployments in {namespace}: {source}")]
    List {
	namespace: String,
	#[source]
	source: kube::Error,
    },

    /* a Deployment update failed, remaining restarts in the batch were aborted */
    #[error("update Deployment {namespace}/{name}: {source}")]
    Update {
	namespace: String,
	name: String,
	#[source]
	source: kube::Error,
    },
}

impl Error {
    /*
     * Whether the failed reconciliation should go back on the queue.
     *
     * A fetch failure is a transient infrastructure fault and retries
     * under the queue's backoff. A restart failure does not: restarts
     * already issued before the failure must not be repeated blindly,
     * so the key is dropped and the error surfaced for the operator.
     */
    pub fn requeue(&self) -> bool {
	matches!(self, Error::Fetch { .. })
    }
}
