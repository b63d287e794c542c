use k8s_openapi::api::core::v1::ConfigMap as KubeConfigMap;

/* ConfigMaps opt in to restarting their consumers with this label */
pub const RESTART_LABEL_KEY: &str = "configrestart/deployment";
pub const RESTART_LABEL_VALUE: &str = "enable";

/* leader-election bookkeeping objects carry this annotation and are never user config */
pub const LEADER_ANNOTATION_KEY: &str = "control-plane.alpha.kubernetes.io/leader";

/*
 * One observed ConfigMap change, as seen by the watch loop. Updated is
 * the only kind that can ever trigger a reconciliation: restarts are
 * meaningful for a data *change*, not for an object appearing (Created,
 * Resynced after a re-list) or disappearing (Deleted).
 */
#[derive(Debug)]
pub enum ObservedChange<'a> {
    Created(&'a KubeConfigMap),
    Updated { old: &'a KubeConfigMap, new: &'a KubeConfigMap },
    Deleted(&'a KubeConfigMap),
    Resynced(&'a KubeConfigMap),
}

/*
 * The enqueue predicate. Pure and deterministic; the watch loop may
 * evaluate it from any worker.
 */
pub fn should_enqueue(change: &ObservedChange) -> bool {
    match change {
	ObservedChange::Updated { old, new } => data_changed(old, new),
	_ => false,
    }
}

fn data_changed(old: &KubeConfigMap, new: &KubeConfigMap) -> bool {
    // ignore the leader election configmap
    if has_leader_marker(new) {
	return false;
    }
    if !has_restart_label(new) {
	return false;
    }

    /* value-wise map comparison: label or annotation edits alone never trigger */
    old.data != new.data
}

pub fn has_restart_label(cm: &KubeConfigMap) -> bool {
    match &cm.metadata.labels {
	Some(labels) => labels.get(RESTART_LABEL_KEY).map(String::as_str) == Some(RESTART_LABEL_VALUE),
	None => false,
    }
}

fn has_leader_marker(cm: &KubeConfigMap) -> bool {
    match &cm.metadata.annotations {
	Some(annotations) => annotations.contains_key(LEADER_ANNOTATION_KEY),
	None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
	pairs.iter()
	    .map(|(k, v)| (String::from(*k), String::from(*v)))
	    .collect()
    }

    fn config_map(labels: &[(&str, &str)], annotations: &[(&str, &str)], data: &[(&str, &str)]) -> KubeConfigMap {
	KubeConfigMap{
	    metadata: ObjectMeta{
		name: Some(String::from("cm1")),
		namespace: Some(String::from("ns1")),
		labels: Some(string_map(labels)),
		annotations: Some(string_map(annotations)),
		..ObjectMeta::default()
	    },
	    data: Some(string_map(data)),
	    ..KubeConfigMap::default()
	}
    }

    fn labeled() -> [(&'static str, &'static str); 1] {
	[(RESTART_LABEL_KEY, RESTART_LABEL_VALUE)]
    }

    #[test]
    fn data_change_with_trigger_label_enqueues() {
	let old = config_map(&labeled(), &[], &[("conf", "a=1")]);
	let new = config_map(&labeled(), &[], &[("conf", "a=2")]);

	assert!(should_enqueue(&ObservedChange::Updated { old: &old, new: &new }));
    }

    #[test]
    fn unchanged_data_never_enqueues() {
	let old = config_map(&labeled(), &[], &[("conf", "a=1")]);
	/* label and annotation edits on top of identical data */
	let new = config_map(
	    &[(RESTART_LABEL_KEY, RESTART_LABEL_VALUE), ("extra", "label")],
	    &[("some", "annotation")],
	    &[("conf", "a=1")],
	);

	assert!(!should_enqueue(&ObservedChange::Updated { old: &old, new: &new }));
    }

    #[test]
    fn leader_marker_suppresses_even_with_label_and_change() {
	let old = config_map(&labeled(), &[], &[("conf", "a=1")]);
	let new = config_map(&labeled(), &[(LEADER_ANNOTATION_KEY, "holder")], &[("conf", "a=2")]);

	assert!(!should_enqueue(&ObservedChange::Updated { old: &old, new: &new }));
    }

    #[test]
    fn missing_or_mismatched_label_suppresses() {
	let old = config_map(&[], &[], &[("conf", "a=1")]);
	let new = config_map(&[], &[], &[("conf", "a=2")]);
	assert!(!should_enqueue(&ObservedChange::Updated { old: &old, new: &new }));

	let old = config_map(&[(RESTART_LABEL_KEY, "disable")], &[], &[("conf", "a=1")]);
	let new = config_map(&[(RESTART_LABEL_KEY, "disable")], &[], &[("conf", "a=2")]);
	assert!(!should_enqueue(&ObservedChange::Updated { old: &old, new: &new }));
    }

    #[test]
    fn only_updates_can_enqueue() {
	let cm = config_map(&labeled(), &[], &[("conf", "a=1")]);

	assert!(!should_enqueue(&ObservedChange::Created(&cm)));
	assert!(!should_enqueue(&ObservedChange::Deleted(&cm)));
	assert!(!should_enqueue(&ObservedChange::Resynced(&cm)));
    }

    #[test]
    fn key_added_to_data_counts_as_change() {
	let old = config_map(&labeled(), &[], &[("conf", "a=1")]);
	let new = config_map(&labeled(), &[], &[("conf", "a=1"), ("extra", "b=2")]);

	assert!(should_enqueue(&ObservedChange::Updated { old: &old, new: &new }));
    }
}
