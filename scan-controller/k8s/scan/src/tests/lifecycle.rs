use super::*;
use crate::events::reason;
use compliance_scan_controller_core::{record::exit_code, ScanResult};
use compliance_scan_controller_k8s_api::{READY_CONDITION, PROCESSING_CONDITION};
use pretty_assertions::assert_eq;

const NODES: [&str; 3] = ["worker-0", "worker-1", "worker-2"];

#[tokio::test]
async fn node_scan_runs_to_completion() {
    let h = harness_with_nodes(&NODES);
    h.store.put_scan(node_scan("workers"));

    let phases = h.settle("workers").await;
    assert_eq!(
        phases,
        vec![ScanPhase::Pending, ScanPhase::Launching, ScanPhase::Running]
    );

    let scan = h.store.scan("workers").unwrap();
    assert!(scan.has_finalizer());
    assert_eq!(scan.spec.scan_type.as_deref(), Some("Node"));
    assert_eq!(scan.spec.raw_result_storage.size.as_deref(), Some("1Gi"));
    assert_eq!(
        scan.spec.raw_result_storage.pv_access_modes,
        vec!["ReadWriteOnce".to_string()]
    );
    assert_eq!(h.store.scanner_pods("workers"), 3);
    assert_eq!(h.store.pvc_count(), 1);
    let status = h.store.status("workers");
    assert_eq!(status.result, Some(ScanResult::NotAvailable));
    assert_eq!(status.remaining_retries, 3);
    assert_eq!(
        status.condition(PROCESSING_CONDITION).map(|c| c.status.as_str()),
        Some("True")
    );

    // Nothing moves while the scanners run.
    assert_eq!(
        h.reconcile("workers").await,
        Reconciled::RequeueAfter(DEFAULT_REQUEUE_AFTER)
    );

    h.store
        .complete_units("workers", &NODES[..2], exit_code::COMPLIANT);
    h.store
        .complete_units("workers", &NODES[2..], exit_code::NON_COMPLIANT);
    assert_eq!(h.settle("workers").await, vec![ScanPhase::Aggregating]);
    assert_eq!(h.store.aggregator_pods("workers"), 1);

    // The aggregator is still running.
    assert_eq!(
        h.reconcile("workers").await,
        Reconciled::RequeueAfter(DEFAULT_REQUEUE_AFTER)
    );

    h.store.complete_aggregator("workers");
    assert_eq!(h.settle("workers").await, vec![ScanPhase::Done]);

    let status = h.store.status("workers");
    assert_eq!(status.result, Some(ScanResult::NonCompliant));
    assert_eq!(status.error_message, None);
    assert_eq!(status.remaining_retries, 3);
    assert!(status.end_timestamp.is_some());
    assert_eq!(
        status.condition(READY_CONDITION).map(|c| c.status.as_str()),
        Some("True")
    );
    assert_eq!(
        h.events.find(reason::RESULT_AVAILABLE).map(|e| e.note),
        Some("ComplianceScan's result is: NON-COMPLIANT".to_string())
    );

    // Execution units are gone once the scan is done; the records stay.
    assert_eq!(h.store.scanner_pods("workers"), 0);
    assert_eq!(h.store.aggregator_pods("workers"), 0);
    assert!(h
        .store
        .config_map(&names::result_record_name("workers", "worker-0"))
        .is_some());
}

#[tokio::test]
async fn done_scan_is_stable() {
    let h = harness_with_nodes(&NODES);
    h.store.put_scan(node_scan("workers"));
    h.settle("workers").await;
    h.store.complete_units("workers", &NODES, exit_code::COMPLIANT);
    h.settle("workers").await;
    h.store.complete_aggregator("workers");
    h.settle("workers").await;
    assert_eq!(h.store.status("workers").result, Some(ScanResult::Compliant));

    let version = h.store.resource_version("workers");
    let events = h.events.count();
    let node_lists = h.store.node_lists();
    for _ in 0..3 {
        assert_eq!(h.reconcile("workers").await, Reconciled::Done);
    }
    assert_eq!(h.store.resource_version("workers"), version);
    assert_eq!(h.events.count(), events);
    // A finished scan has no use for its targets.
    assert_eq!(h.store.node_lists(), node_lists);
}

#[tokio::test]
async fn phases_only_move_forward() {
    let h = harness_with_nodes(&NODES);
    h.store.put_scan(node_scan("workers"));
    let mut phases = h.settle("workers").await;

    // A scanner that disappears sends the scan back to be relaunched.
    h.store.remove_pod(&names::unit_name("workers", "worker-1"));
    let relaunched = h.settle("workers").await;
    assert_eq!(relaunched, vec![ScanPhase::Launching, ScanPhase::Running]);
    assert!(h.store.pod(&names::unit_name("workers", "worker-1")).is_some());
    phases.extend(relaunched);

    h.store.complete_units("workers", &NODES, exit_code::COMPLIANT);
    phases.extend(h.settle("workers").await);
    h.store.complete_aggregator("workers");
    phases.extend(h.settle("workers").await);

    assert_monotonic(&phases);
    assert_eq!(phases.last(), Some(&ScanPhase::Done));
}

#[tokio::test]
async fn platform_scan_uses_a_single_unit() {
    let h = Harness::new();
    h.store.put_scan(platform_scan("platform"));

    h.settle("platform").await;
    let unit = h
        .store
        .pod(&names::unit_name("platform", names::PLATFORM_TARGET))
        .expect("platform unit must exist");
    assert_eq!(unit.spec.unwrap().node_selector, None);
    assert_eq!(h.store.scanner_pods("platform"), 1);

    h.store.complete_units(
        "platform",
        &[names::PLATFORM_TARGET],
        exit_code::NOT_APPLICABLE,
    );
    h.settle("platform").await;
    h.store.complete_aggregator("platform");
    h.settle("platform").await;

    let status = h.store.status("platform");
    assert_eq!(status.phase, Some(ScanPhase::Done));
    assert_eq!(status.result, Some(ScanResult::NotApplicable));
    assert!(h.events.reasons().contains(&reason::NOT_APPLICABLE));
}

#[tokio::test]
async fn inconsistent_checks_override_the_result() {
    let h = harness_with_nodes(&NODES);
    h.store.set_inconsistent_checks("workers", 2);
    h.store.set_outdated_remediations();
    h.store.put_scan(node_scan("workers"));
    h.settle("workers").await;
    h.store.complete_units("workers", &NODES, exit_code::COMPLIANT);
    h.settle("workers").await;
    h.store.complete_aggregator("workers");
    h.settle("workers").await;

    let status = h.store.status("workers");
    assert_eq!(status.result, Some(ScanResult::Inconsistent));
    assert!(status
        .error_message
        .unwrap()
        .contains("compliance.openshift.io/inconsistent-check"));
    let reasons = h.events.reasons();
    assert!(reasons.contains(&reason::NOT_CONSISTENT));
    assert!(reasons.contains(&reason::OUTDATED_REMEDIATIONS));
}

#[tokio::test]
async fn inconsistency_only_affects_its_own_scan() {
    let h = harness_with_nodes(&NODES);
    h.store.set_inconsistent_checks("masters", 1);
    h.store.put_scan(node_scan("workers"));
    h.store.put_scan(node_scan("masters"));
    for scan in ["workers", "masters"] {
        h.settle(scan).await;
        h.store.complete_units(scan, &NODES, exit_code::COMPLIANT);
        h.settle(scan).await;
        h.store.complete_aggregator(scan);
        h.settle(scan).await;
    }

    assert_eq!(h.store.status("workers").result, Some(ScanResult::Compliant));
    assert_eq!(h.store.status("workers").error_message, None);
    assert_eq!(
        h.store.status("masters").result,
        Some(ScanResult::Inconsistent)
    );
}

/// Finishes every scanner but leaves `worker-0` without a result record.
async fn aggregate_without_first_record(h: &Harness) -> Vec<ScanPhase> {
    let mut phases = h.settle("workers").await;
    h.store.complete_units("workers", &NODES[1..], exit_code::COMPLIANT);
    h.store
        .set_pod_phase(&names::unit_name("workers", "worker-0"), "Succeeded");
    let aggregating = h.settle("workers").await;
    assert_eq!(aggregating, vec![ScanPhase::Aggregating]);
    phases.extend(aggregating);
    phases
}

#[tokio::test]
async fn failed_unit_during_aggregation_invalidates_the_scan() {
    let h = harness_with_nodes(&NODES);
    h.store.put_scan(node_scan("workers"));
    aggregate_without_first_record(&h).await;
    assert_eq!(
        h.reconcile("workers").await,
        Reconciled::RequeueAfter(DEFAULT_REQUEUE_AFTER)
    );

    h.store.write_record(
        "workers",
        "worker-0",
        exit_code::ERROR,
        Some("content could not be loaded"),
    );
    assert_eq!(h.settle("workers").await, vec![ScanPhase::Done]);

    let status = h.store.status("workers");
    assert_eq!(status.result, Some(ScanResult::Error));
    let ready = status.condition(READY_CONDITION).unwrap();
    assert_eq!(ready.status, "False");
    assert_eq!(ready.reason, "Invalid");
    assert_eq!(h.store.aggregator_pods("workers"), 0);
}

#[tokio::test]
async fn unit_lost_before_its_result_is_relaunched() {
    let h = harness_with_nodes(&NODES);
    h.store.put_scan(node_scan("workers"));
    let mut phases = aggregate_without_first_record(&h).await;

    h.store.remove_pod(&names::unit_name("workers", "worker-0"));
    let relaunched = h.settle("workers").await;
    assert_eq!(relaunched, vec![ScanPhase::Launching, ScanPhase::Running]);
    assert!(h
        .store
        .pod(&names::unit_name("workers", "worker-0"))
        .is_some());
    phases.extend(relaunched);

    h.store.complete_units("workers", &NODES[..1], exit_code::COMPLIANT);
    phases.extend(h.settle("workers").await);
    h.store.complete_aggregator("workers");
    phases.extend(h.settle("workers").await);

    assert_monotonic(&phases);
    assert_eq!(h.store.status("workers").result, Some(ScanResult::Compliant));
}

#[tokio::test]
async fn unrecoverable_error_skips_aggregation() {
    let h = harness_with_nodes(&NODES);
    h.store.put_scan(node_scan("workers"));
    h.settle("workers").await;

    h.store.complete_units("workers", &NODES[1..], exit_code::COMPLIANT);
    h.store
        .set_pod_phase(&names::unit_name("workers", "worker-0"), "Succeeded");
    h.store.write_record(
        "workers",
        "worker-0",
        exit_code::ERROR,
        Some("content could not be loaded"),
    );
    assert_eq!(
        h.settle("workers").await,
        vec![ScanPhase::Aggregating, ScanPhase::Done]
    );

    let status = h.store.status("workers");
    assert_eq!(status.result, Some(ScanResult::Error));
    assert_eq!(
        status.error_message.as_deref(),
        Some("content could not be loaded")
    );
    assert_eq!(h.store.aggregator_pods("workers"), 0);
}

#[tokio::test]
async fn debug_scan_keeps_its_units() {
    let h = harness_with_nodes(&NODES);
    let mut scan = node_scan("workers");
    scan.spec.debug = true;
    h.store.put_scan(scan);
    h.store.put_deployment(
        "workers-rs",
        Selector::for_scan("workers")
            .with(labels::WORKLOAD, labels::RESULT_SERVER_WORKLOAD)
            .labels(),
        1,
    );

    h.settle("workers").await;
    h.store.complete_units("workers", &NODES, exit_code::COMPLIANT);
    h.settle("workers").await;
    h.store.complete_aggregator("workers");
    h.settle("workers").await;

    assert_eq!(h.store.status("workers").phase, Some(ScanPhase::Done));
    assert_eq!(h.store.scanner_pods("workers"), 3);
    assert_eq!(h.store.deployment_replicas("workers-rs"), Some(0));
}

#[tokio::test]
async fn rescan_starts_over_and_wraps_the_index() {
    let h = harness_with_nodes(&NODES);
    h.store.put_scan(node_scan("workers"));
    h.settle("workers").await;
    h.store.complete_units("workers", &NODES, exit_code::COMPLIANT);
    h.settle("workers").await;
    h.store.complete_aggregator("workers");
    h.settle("workers").await;

    h.store.edit_scan("workers", |scan| {
        scan.annotations_mut()
            .insert(labels::RESCAN_ANNOTATION.to_string(), String::new());
        if let Some(status) = scan.status.as_mut() {
            status.current_index = i64::MAX;
        }
    });
    let phases = h.settle("workers").await;
    assert_eq!(
        phases,
        vec![ScanPhase::Pending, ScanPhase::Launching, ScanPhase::Running]
    );

    let scan = h.store.scan("workers").unwrap();
    assert!(!scan.needs_rescan());
    let status = scan.status.unwrap();
    assert_eq!(status.current_index, 0);
    assert_eq!(status.result, Some(ScanResult::NotAvailable));
    assert_eq!(status.end_timestamp, None);
    assert!(status.start_timestamp.is_some());
    assert!(h
        .store
        .config_map(&names::result_record_name("workers", "worker-0"))
        .is_none());
    assert_eq!(h.store.scanner_pods("workers"), 3);
}
