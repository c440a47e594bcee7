use super::{Reconciled, Reconciler};
use crate::{
    events::{reason, ScanEvent},
    handler::{self, Poll, Readiness, ScanTypeHandler},
    workload, Result,
};
use compliance_scan_controller_core::{
    aggregate::Aggregate,
    names,
    retry::{RetryBudget, TimeoutDecision},
    ScanPhase, ScanResult,
};
use compliance_scan_controller_k8s_api::{labels, now, ComplianceScan, ResourceExt};
use tracing::{debug, info, warn};

const TIMEOUT_MESSAGE: &str = "Timeout while waiting for the scan pod to be finished.";

impl Reconciler {
    pub(super) async fn pending(&self, scan: &ComplianceScan) -> Result<Reconciled> {
        if scan.needs_rescan() || scan.timed_out_targets().is_some() {
            let mut updated = scan.clone();
            let annotations = updated.annotations_mut();
            annotations.remove(labels::RESCAN_ANNOTATION);
            annotations.remove(labels::TIMEOUT_ANNOTATION);
            self.store.replace_scan(&updated).await?;
            debug!("Cleared rescan annotations");
            return Ok(Reconciled::Done);
        }

        let mut status = scan.status_or_default();
        status.phase = Some(ScanPhase::Launching);
        status.result = Some(ScanResult::NotAvailable);
        status.start_timestamp = Some(now());
        status.end_timestamp = None;
        status.error_message = None;
        status.warnings = None;
        self.write_status(scan, status).await?;
        Ok(Reconciled::Done)
    }

    pub(super) async fn launching(
        &self,
        scan: &ComplianceScan,
        handler: &dyn ScanTypeHandler,
    ) -> Result<Reconciled> {
        if !self.prerequisites.ensure(scan).await? {
            debug!("Prerequisites are not ready");
            return Ok(Reconciled::RequeueAfter(self.config.requeue_after));
        }

        if let Err(error) = handler.create_workload().await {
            if error.retriable {
                warn!(%error, "Failed to create scan pods");
                return Ok(Reconciled::RequeueAfter(self.config.requeue_after));
            }

            warn!(%error, "Cannot create scan pods");
            let now = now();
            let mut status = scan.status_or_default();
            status.phase = Some(ScanPhase::Done);
            status.result = Some(ScanResult::Error);
            status.error_message = Some(error.to_string());
            status.end_timestamp = Some(now.clone());
            status.set_condition_invalid(&now);
            self.finish(scan, status).await?;
            return Ok(Reconciled::Done);
        }

        let mut status = scan.status_or_default();
        status.phase = Some(ScanPhase::Running);
        status.set_conditions_processing(&now());
        self.write_status(scan, status).await?;
        Ok(Reconciled::Done)
    }

    pub(super) async fn running(
        &self,
        scan: &ComplianceScan,
        handler: &dyn ScanTypeHandler,
    ) -> Result<Reconciled> {
        match handler.poll_running().await? {
            Poll::Running => Ok(Reconciled::RequeueAfter(self.config.requeue_after)),
            Poll::Finished => {
                let mut status = scan.status_or_default();
                status.phase = Some(ScanPhase::Aggregating);
                self.write_status(scan, status).await?;
                Ok(Reconciled::Done)
            }
            Poll::Missing(target) => {
                info!(%target, "A scan pod is missing, relaunching");
                let mut status = scan.status_or_default();
                status.phase = Some(ScanPhase::Launching);
                self.write_status(scan, status).await?;
                Ok(Reconciled::RequeueAfter(self.config.requeue_after))
            }
            Poll::TimedOut(targets) => self.timed_out(scan, targets).await,
        }
    }

    /// Finishes a scan whose units ran too long, arranging a rescan if the budget allows it.
    async fn timed_out(&self, scan: &ComplianceScan, targets: Vec<String>) -> Result<Reconciled> {
        let current = scan.status_or_default();
        let budget = RetryBudget {
            remaining: current.remaining_retries,
            max: scan.max_retries(),
        };
        let targets = targets.join(",");

        let mut updated = scan.clone();
        updated
            .annotations_mut()
            .insert(labels::TIMEOUT_ANNOTATION.to_string(), targets.clone());

        let now = now();
        let mut status = current;
        status.phase = Some(ScanPhase::Done);
        status.result = Some(ScanResult::Error);
        status.error_message = Some(TIMEOUT_MESSAGE.to_string());
        status.end_timestamp = Some(now.clone());
        status.set_condition_timeout(&now);

        match budget.on_timeout() {
            TimeoutDecision::Retry { remaining } => {
                info!(%targets, remaining, "Retrying scan after timeout");
                updated
                    .annotations_mut()
                    .insert(labels::RESCAN_ANNOTATION.to_string(), String::new());
                let updated = self.store.replace_scan(&updated).await?;
                status.remaining_retries = remaining;
                let written = self.write_status(&updated, status).await?;
                self.events
                    .publish(
                        &written,
                        ScanEvent::warning(
                            reason::RETRYING,
                            format!(
                                "Retrying scan {} due to timeout on {targets}",
                                scan.name_any()
                            ),
                        ),
                    )
                    .await;
            }
            TimeoutDecision::Exhausted { reset_to } => {
                info!(%targets, "Scan timed out with no retries left");
                let updated = self.store.replace_scan(&updated).await?;
                status.remaining_retries = reset_to;
                self.finish(&updated, status).await?;
            }
        }
        Ok(Reconciled::Done)
    }

    pub(super) async fn aggregating(
        &self,
        scan: &ComplianceScan,
        handler: &dyn ScanTypeHandler,
    ) -> Result<Reconciled> {
        let requeue = Reconciled::RequeueAfter(self.config.requeue_after);

        let warnings = match handler.ready_to_aggregate().await? {
            Readiness::NotReady => return Ok(requeue),
            Readiness::Failed { warnings, error } => {
                info!(%error, "Scan failed, skipping aggregation");
                let now = now();
                let mut status = scan.status_or_default();
                status.phase = Some(ScanPhase::Done);
                status.result = Some(ScanResult::Error);
                status.error_message = Some(error);
                status.warnings = warnings;
                status.end_timestamp = Some(now.clone());
                status.set_condition_invalid(&now);
                self.finish(scan, status).await?;
                return Ok(Reconciled::Done);
            }
            Readiness::Missing(target) => {
                info!(%target, "A scan pod is missing its result, relaunching");
                let mut status = scan.status_or_default();
                status.phase = Some(ScanPhase::Launching);
                self.write_status(scan, status).await?;
                return Ok(requeue);
            }
            Readiness::Ready { warnings } => warnings,
        };

        let ns = &self.config.operator_namespace;
        let name = scan.name_any();
        match self.store.get_pod(ns, &names::aggregator_name(&name)).await? {
            None => {
                let mut pod = workload::aggregator_pod(&self.config, scan);
                let priority_class = handler::priority_class(self.context(), scan).await?;
                if let Some(spec) = pod.spec.as_mut() {
                    spec.priority_class_name = priority_class;
                }
                self.store.create_pod(ns, &pod).await?;
                debug!("Launched aggregator");
                return Ok(Reconciled::RequeueAfter(self.config.requeue_after / 2));
            }
            Some(pod) if !workload::is_succeeded(&pod) => {
                debug!("Aggregator is still running");
                return Ok(requeue);
            }
            Some(_) => {}
        }

        let (verdict, skipped) = match handler.gather_result().await? {
            Aggregate::NotReady => return Ok(requeue),
            Aggregate::Ready { verdict, skipped } => (verdict, skipped),
        };
        for target in skipped {
            info!(%target, "Skipping result for unschedulable node");
            self.events
                .publish(
                    scan,
                    ScanEvent::warning(
                        reason::UNSCHEDULABLE_NODE,
                        format!("Skipping result for scan: Node is unschedulable: {target}"),
                    ),
                )
                .await;
        }

        let scan_ns = scan.namespace().unwrap_or_default();
        let inconsistent = self
            .store
            .count_inconsistent_checks(&scan_ns, &name)
            .await?;
        let verdict = verdict.with_consistency(inconsistent);

        let now = now();
        let mut status = scan.status_or_default();
        status.phase = Some(ScanPhase::Done);
        status.result = Some(verdict.result);
        status.error_message = verdict.error;
        status.warnings = warnings;
        status.end_timestamp = Some(now.clone());
        status.remaining_retries = scan.max_retries();
        status.set_condition_ready(&now);
        let written = self.finish(scan, status).await?;
        info!(result = ?written.status.and_then(|s| s.result), "Scan is done");
        Ok(Reconciled::Done)
    }

    /// Releases a finished scan's resources and starts a rescan when one was requested.
    pub(super) async fn done(&self, scan: &ComplianceScan, deleting: bool) -> Result<Reconciled> {
        let rescan = scan.needs_rescan();
        if !deleting && scan.spec.debug && !rescan {
            debug!("Keeping debug scan pods");
            self.prerequisites.suspend(scan).await?;
            return Ok(Reconciled::Done);
        }

        let ns = &self.config.operator_namespace;
        let name = scan.name_any();
        match scan.scan_type() {
            Ok(scan_type) => {
                handler::for_cleanup(self.context(), scan, scan_type)
                    .cleanup()
                    .await?
            }
            Err(_) => {
                self.store
                    .delete_pods(ns, &workload::scanner_selector(&name))
                    .await?
            }
        }
        self.store
            .delete_pods(ns, &workload::aggregator_selector(&name))
            .await?;
        self.prerequisites.teardown(scan).await?;

        if rescan && !deleting {
            info!("Starting rescan");
            self.store
                .delete_config_maps(ns, &workload::result_selector(&name))
                .await?;

            let now = now();
            let mut status = scan.status_or_default();
            status.phase = Some(ScanPhase::Pending);
            status.result = Some(ScanResult::NotAvailable);
            status.start_timestamp = Some(now.clone());
            status.end_timestamp = None;
            status.current_index = status.current_index.checked_add(1).unwrap_or(0);
            status.set_condition_pending(&now);
            self.write_status(scan, status).await?;
        }
        Ok(Reconciled::Done)
    }
}
