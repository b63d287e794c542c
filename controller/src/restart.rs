use crate::client;
use crate::client::ClusterClient;
use crate::errors::Error;

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment as KubeDeployment;
use kube::api::ObjectMeta;
use log;
use std::collections::BTreeMap;

/* touched on the pod template to roll the Deployment's pods */
pub const RESTART_ANNOTATION: &str = "configmap-controller/restart";

/* attribution identity for every write this controller issues */
pub const FIELD_MANAGER: &str = "configmap-controller";

/*
 * Restart every Deployment of `namespace` that mounts `config_map` as a
 * volume: stamp the restart annotation on its pod template with the
 * current RFC3339 time and write the object back. Returns how many
 * Deployments were restarted.
 *
 * A Deployment deleted between list and update is skipped; any other
 * update failure aborts the remaining batch and surfaces. Restarts
 * already written before the failure stay written.
 */
pub async fn restart_dependents(cluster: &dyn ClusterClient, namespace: &str, config_map: &str) -> Result<usize, Error> {
    let deployments = match cluster.list_deployments(namespace).await {
	Ok(deployments) => deployments,
	Err(source) => {
	    return Err(Error::List{
		namespace: String::from(namespace),
		source,
	    });
	}
    };

    let mut restarted = 0;
    for mut deploy in deployments {
	if !mounts_config_map(&deploy, config_map) {
	    continue;
	}

	let name = match deploy.metadata.name.clone() {
	    Some(name) => name,
	    None => continue,
	};

	stamp_pod_template(&mut deploy, &Utc::now().to_rfc3339());
	match cluster.update_deployment(namespace, &name, &deploy).await {
	    Ok(()) => {
		log::info!("restarted Deployment {}/{} for ConfigMap {}", namespace, name, config_map);
		restarted += 1;
	    },
	    Err(err) if client::is_not_found(&err) => {
		log::info!("Deployment {}/{} vanished before restart, skipping", namespace, name);
	    },
	    Err(source) => {
		return Err(Error::Update{
		    namespace: String::from(namespace),
		    name,
		    source,
		});
	    }
	}
    }

    Ok(restarted)
}

/*
 * Membership test: does any pod-template volume reference a ConfigMap
 * source named `config_map`?
 */
pub fn mounts_config_map(deploy: &KubeDeployment, config_map: &str) -> bool {
    let volumes = deploy.spec.as_ref()
	.and_then(|spec| spec.template.spec.as_ref())
	.and_then(|pod| pod.volumes.as_ref());

    match volumes {
	Some(volumes) => volumes.iter().any(|volume| {
	    volume.config_map.as_ref().map(|src| src.name.as_str()) == Some(config_map)
	}),
	None => false,
    }
}

fn stamp_pod_template(deploy: &mut KubeDeployment, stamp: &str) {
    let spec = match deploy.spec.as_mut() {
	Some(spec) => spec,
	None => return,
    };

    spec.template.metadata
	.get_or_insert_with(ObjectMeta::default)
	.annotations
	.get_or_insert_with(BTreeMap::new)
	.insert(String::from(RESTART_ANNOTATION), String::from(stamp));
}
