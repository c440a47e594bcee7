//! Builds the pods and records that make up a scan's workload, and reads back what happened to
//! them.

use crate::Config;
use compliance_scan_controller_core::{
    names,
    record::ResultRecord,
    retry::{UnitObservation, UnitPhase},
};
use compliance_scan_controller_k8s_api::{
    labels, ComplianceScan, ConfigMap, Container, ObjectMeta, Pod, PodSpec, ResourceExt,
    Selector, Time, Toleration,
};
use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, HostPathVolumeSource, PersistentVolumeClaimVolumeSource, Volume,
    VolumeMount,
};
use maplit::btreemap;
use std::time::Duration;

const CONTENT_VOLUME: &str = "content-dir";
const CONTENT_PATH: &str = "/content";
const HOST_VOLUME: &str = "host";
const HOST_PATH: &str = "/host";
const RAW_RESULTS_VOLUME: &str = "raw-results";
const RAW_RESULTS_PATH: &str = "/raw-results";

/// What a scanner pod inspects.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Subject<'t> {
    Node(&'t str),
    Platform,
}

pub(crate) fn scanner_selector(scan: &str) -> Selector {
    Selector::for_scan(scan).with(labels::WORKLOAD, labels::SCANNER_WORKLOAD)
}

pub(crate) fn aggregator_selector(scan: &str) -> Selector {
    Selector::for_scan(scan).with(labels::WORKLOAD, labels::AGGREGATOR_WORKLOAD)
}

pub(crate) fn result_selector(scan: &str) -> Selector {
    Selector::for_scan(scan).with(labels::SCAN_RESULT, "")
}

fn unit_labels(selector: Selector, scan: &ComplianceScan) -> labels::Map {
    match scan.namespace() {
        Some(ns) => selector.with(labels::SCAN_NAMESPACE, ns).labels(),
        None => selector.labels(),
    }
}

pub(crate) fn scanner_pod(config: &Config, scan: &ComplianceScan, subject: Subject<'_>) -> Pod {
    let name = scan.name_any();
    let target = match subject {
        Subject::Node(node) => node,
        Subject::Platform => names::PLATFORM_TARGET,
    };
    let record = names::result_record_name(&name, target);
    let content_image = scan
        .spec
        .content_image
        .clone()
        .unwrap_or_else(|| config.content_image.clone());
    let content = scan.spec.content.clone().unwrap_or_default();

    let mut args = vec![
        "scan".to_string(),
        format!("--profile={}", scan.spec.profile.as_deref().unwrap_or_default()),
        format!("--content={CONTENT_PATH}/{content}"),
        format!("--result-record={record}"),
        format!("--namespace={}", config.operator_namespace),
    ];
    let mut mounts = vec![mount(CONTENT_VOLUME, CONTENT_PATH, true)];
    let mut volumes = vec![Volume {
        name: CONTENT_VOLUME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }];

    let mut node_selector = None;
    match subject {
        Subject::Node(node) => {
            args.push(format!("--root={HOST_PATH}"));
            mounts.push(mount(HOST_VOLUME, HOST_PATH, true));
            volumes.push(Volume {
                name: HOST_VOLUME.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: "/".to_string(),
                    type_: Some("Directory".to_string()),
                }),
                ..Default::default()
            });
            node_selector = Some(btreemap! { labels::HOSTNAME.to_string() => node.to_string() });
        }
        Subject::Platform => args.push("--platform".to_string()),
    }
    if scan.spec.debug {
        args.push("--debug".to_string());
    }

    Pod {
        metadata: ObjectMeta {
            name: Some(names::unit_name(&name, target)),
            namespace: Some(config.operator_namespace.clone()),
            labels: Some(unit_labels(scanner_selector(&name), scan)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            init_containers: Some(vec![Container {
                name: "content-container".to_string(),
                image: Some(content_image),
                command: Some(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!("cp /{content} {CONTENT_PATH}/"),
                ]),
                volume_mounts: Some(vec![mount(CONTENT_VOLUME, CONTENT_PATH, false)]),
                ..Default::default()
            }]),
            containers: vec![Container {
                name: "scanner".to_string(),
                image: Some(config.scanner_image.clone()),
                args: Some(args),
                volume_mounts: Some(mounts),
                ..Default::default()
            }],
            volumes: Some(volumes),
            node_selector,
            tolerations: Some(vec![Toleration {
                operator: Some("Exists".to_string()),
                ..Default::default()
            }]),
            restart_policy: Some("OnFailure".to_string()),
            priority_class_name: scan.spec.priority_class.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn aggregator_pod(config: &Config, scan: &ComplianceScan) -> Pod {
    let name = scan.name_any();
    Pod {
        metadata: ObjectMeta {
            name: Some(names::aggregator_name(&name)),
            namespace: Some(config.operator_namespace.clone()),
            labels: Some(unit_labels(aggregator_selector(&name), scan)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "aggregator".to_string(),
                image: Some(config.aggregator_image.clone()),
                args: Some(vec![
                    "aggregator".to_string(),
                    format!("--scan={name}"),
                    format!("--namespace={}", config.operator_namespace),
                    format!("--raw-results={RAW_RESULTS_PATH}"),
                ]),
                volume_mounts: Some(vec![mount(RAW_RESULTS_VOLUME, RAW_RESULTS_PATH, true)]),
                ..Default::default()
            }],
            volumes: Some(vec![Volume {
                name: RAW_RESULTS_VOLUME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: names::raw_results_name(&name),
                    read_only: Some(true),
                }),
                ..Default::default()
            }]),
            restart_policy: Some("OnFailure".to_string()),
            priority_class_name: scan.spec.priority_class.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The record written on behalf of a unit whose target cannot be scheduled.
pub(crate) fn unschedulable_record(
    config: &Config,
    scan: &str,
    target: &str,
    message: &str,
) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(names::result_record_name(scan, target)),
            namespace: Some(config.operator_namespace.clone()),
            labels: Some(result_selector(scan).labels()),
            ..Default::default()
        },
        data: Some(ResultRecord::unschedulable(message).into_data()),
        ..Default::default()
    }
}

pub(crate) fn observe(pod: &Pod, now: &Time) -> UnitObservation {
    let status = pod.status.as_ref();
    let phase = match status.and_then(|s| s.phase.as_deref()) {
        Some("Pending") => UnitPhase::Pending,
        Some("Running") => UnitPhase::Running,
        Some("Succeeded") => UnitPhase::Succeeded,
        Some("Failed") => UnitPhase::Failed,
        _ => UnitPhase::Unknown,
    };

    let unschedulable = status
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .find(|c| {
            c.type_ == "PodScheduled"
                && c.status == "False"
                && c.reason.as_deref() == Some("Unschedulable")
        })
        .map(|c| c.message.clone().unwrap_or_else(|| "pod is unschedulable".to_string()));

    let age = match &pod.metadata.creation_timestamp {
        Some(Time(created)) => {
            let millis = now.0.timestamp_millis() - created.timestamp_millis();
            Duration::from_millis(u64::try_from(millis).unwrap_or(0))
        }
        None => Duration::ZERO,
    };

    UnitObservation {
        phase,
        unschedulable,
        age,
    }
}

pub(crate) fn is_succeeded(pod: &Pod) -> bool {
    pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Succeeded")
}

fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: Some(read_only),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliance_scan_controller_k8s_api::{ComplianceScanSpec, PodStatus};
    use k8s_openapi::api::core::v1::PodCondition;
    use pretty_assertions::assert_eq;

    fn config() -> Config {
        Config {
            operator_namespace: "openshift-compliance".to_string(),
            scanner_image: "scanner:test".to_string(),
            aggregator_image: "aggregator:test".to_string(),
            content_image: "content:test".to_string(),
            requeue_after: crate::DEFAULT_REQUEUE_AFTER,
        }
    }

    fn scan() -> ComplianceScan {
        let mut scan = ComplianceScan::new(
            "workers",
            ComplianceScanSpec {
                priority_class: Some("critical".to_string()),
                content: Some("ssg-rhcos4-ds.xml".to_string()),
                ..Default::default()
            },
        );
        scan.metadata.namespace = Some("security".to_string());
        scan
    }

    fn ts(seconds: i64) -> Time {
        Time(k8s_openapi::chrono::DateTime::from_timestamp(seconds, 0).unwrap())
    }

    #[test]
    fn node_scanner_is_pinned_and_tolerant() {
        let pod = scanner_pod(&config(), &scan(), Subject::Node("worker-0"));
        assert_eq!(pod.metadata.name.as_deref(), Some("workers-worker-0-pod"));
        assert_eq!(
            pod.metadata.labels,
            Some(btreemap! {
                labels::SCAN_NAME.to_string() => "workers".to_string(),
                labels::SCAN_NAMESPACE.to_string() => "security".to_string(),
                labels::WORKLOAD.to_string() => labels::SCANNER_WORKLOAD.to_string(),
            })
        );
        let spec = pod.spec.unwrap();
        assert_eq!(
            spec.node_selector,
            Some(btreemap! { labels::HOSTNAME.to_string() => "worker-0".to_string() })
        );
        assert_eq!(spec.restart_policy.as_deref(), Some("OnFailure"));
        assert_eq!(spec.priority_class_name.as_deref(), Some("critical"));
        let tolerations = spec.tolerations.unwrap();
        assert_eq!(tolerations[0].operator.as_deref(), Some("Exists"));
        assert_eq!(
            spec.init_containers.unwrap()[0].image.as_deref(),
            Some("content:test")
        );
    }

    #[test]
    fn platform_scanner_is_not_pinned() {
        let pod = scanner_pod(&config(), &scan(), Subject::Platform);
        assert_eq!(pod.metadata.name.as_deref(), Some("workers-platform-pod"));
        let spec = pod.spec.unwrap();
        assert_eq!(spec.node_selector, None);
        assert!(spec.containers[0]
            .args
            .as_ref()
            .unwrap()
            .contains(&"--platform".to_string()));
    }

    #[test]
    fn aggregator_mounts_raw_results() {
        let pod = aggregator_pod(&config(), &scan());
        assert_eq!(pod.metadata.name.as_deref(), Some("aggregator-pod-workers"));
        assert_eq!(
            pod.metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(labels::SCAN_NAMESPACE))
                .map(String::as_str),
            Some("security")
        );
        let volumes = pod.spec.unwrap().volumes.unwrap();
        assert_eq!(
            volumes[0].persistent_volume_claim.as_ref().unwrap().claim_name,
            "workers"
        );
    }

    #[test]
    fn observes_age_and_scheduling() {
        let pod = Pod {
            metadata: ObjectMeta {
                creation_timestamp: Some(ts(1_000)),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some("Pending".to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "PodScheduled".to_string(),
                    status: "False".to_string(),
                    reason: Some("Unschedulable".to_string()),
                    message: Some("0/3 nodes are available".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let observed = observe(&pod, &ts(1_090));
        assert_eq!(
            observed,
            UnitObservation {
                phase: UnitPhase::Pending,
                unschedulable: Some("0/3 nodes are available".to_string()),
                age: Duration::from_secs(90),
            }
        );
    }

    #[test]
    fn clock_skew_is_not_negative_age() {
        let pod = Pod {
            metadata: ObjectMeta {
                creation_timestamp: Some(ts(2_000)),
                ..Default::default()
            },
            ..Default::default()
        };
        let observed = observe(&pod, &ts(1_000));
        assert_eq!(observed.age, Duration::ZERO);
        assert_eq!(observed.phase, UnitPhase::Unknown);
    }

    #[test]
    fn unschedulable_record_is_labeled() {
        let cm = unschedulable_record(&config(), "workers", "worker-1", "node is cordoned");
        assert_eq!(cm.metadata.name.as_deref(), Some("workers-worker-1-pod"));
        let record = ResultRecord::from_data(cm.data.as_ref().unwrap());
        assert!(record.is_unschedulable());
        assert_eq!(
            cm.metadata.labels.unwrap().get(labels::SCAN_RESULT),
            Some(&String::new())
        );
    }
}
