use crate::restart;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment as KubeDeployment;
use k8s_openapi::api::core::v1::ConfigMap as KubeConfigMap;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::Error as KubeError;
use kube::api::ListParams as KubeListParams;
use kube::api::PostParams as KubePostParams;
use kube::core::ErrorResponse;

/*
 * ClusterClient is the seam between the core logic and the cluster's
 * resource store. The controller only ever needs these three calls:
 * fetch one ConfigMap, list the Deployments of a namespace, and write
 * one Deployment back.
 *
 * All calls return kube errors untranslated; the callers wrap them
 * with resource context (see errors::Error).
 */
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /* resolves to None when the ConfigMap does not exist */
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<KubeConfigMap>, KubeError>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<KubeDeployment>, KubeError>;

    /* full update carrying the controller's field manager identity */
    async fn update_deployment(&self, namespace: &str, name: &str, deployment: &KubeDeployment) -> Result<(), KubeError>;
}

/*
 * The production implementation, backed by a kube client.
 */
pub struct KubeClusterClient {
    kube_client: KubeClient,
}

impl KubeClusterClient {
    pub fn new(kube_client: KubeClient) -> Self {
	Self{
	    kube_client,
	}
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<KubeConfigMap>, KubeError> {
	let configmaps: KubeApi<KubeConfigMap> = KubeApi::namespaced(self.kube_client.clone(), namespace);

	configmaps.get_opt(name).await
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<KubeDeployment>, KubeError> {
	let deployments: KubeApi<KubeDeployment> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	let list = deployments.list(&KubeListParams::default()).await?;

	Ok(list.items)
    }

    async fn update_deployment(&self, namespace: &str, name: &str, deployment: &KubeDeployment) -> Result<(), KubeError> {
	let deployments: KubeApi<KubeDeployment> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	let opts = KubePostParams{
	    dry_run: false,
	    field_manager: Some(String::from(restart::FIELD_MANAGER)),
	};

	deployments.replace(name, &opts, deployment).await?;
	Ok(())
    }
}

/*
 * The store answers 404 both for objects that never existed and for
 * ones deleted between list and update; both read the same here.
 */
pub fn is_not_found(err: &KubeError) -> bool {
    matches!(err, KubeError::Api(ErrorResponse { code: 404, .. }))
}
