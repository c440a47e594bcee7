mod phases;

use crate::{
    events::{reason, ScanEvent},
    handler::{self, Context, Validity},
    metrics::ScanMetrics,
    Config, Error, EventSink, Prerequisites, Result, Store,
};
use compliance_scan_controller_core::{aggregate::Verdict, ScanPhase, ScanResult, ScanType};
use compliance_scan_controller_k8s_api::{
    labels, now, quantity, ComplianceScan, ComplianceScanStatus, ResourceExt, Selector,
    DEFAULT_ACCESS_MODE, DEFAULT_RAW_STORAGE_SIZE,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

/// Drives scans through their phases.
///
/// Each call to [`Reconciler::reconcile`] reloads the scan and advances it by at most one phase.
/// Every write carries the resource version it was derived from, so a concurrent change fails the
/// pass with [`Error::Conflict`] and the pass is retried against the fresh object.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    events: Arc<dyn EventSink>,
    prerequisites: Arc<dyn Prerequisites>,
    metrics: ScanMetrics,
    config: Arc<Config>,
}

/// What the caller should do after a pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reconciled {
    /// Wait for the scan to change.
    Done,
    RequeueAfter(Duration),
}

// === impl Reconciler ===

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventSink>,
        prerequisites: Arc<dyn Prerequisites>,
        metrics: ScanMetrics,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            events,
            prerequisites,
            metrics,
            config,
        }
    }

    pub fn record_error(&self, error: &Error) {
        self.metrics.inc_error(error.reason());
    }

    #[instrument(skip(self))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Reconciled> {
        let Some(scan) = self.store.get_scan(namespace, name).await? else {
            debug!("Scan not found");
            return Ok(Reconciled::Done);
        };

        if scan.is_deleting() {
            return self.delete(scan).await;
        }

        if !scan.has_finalizer() {
            let mut scan = scan;
            scan.finalizers_mut()
                .push(labels::SCAN_FINALIZER.to_string());
            self.store.replace_scan(&scan).await?;
            debug!("Added finalizer");
            return Ok(Reconciled::Done);
        }

        if let Some(stop) = self.validate(&scan).await? {
            return Ok(stop);
        }

        let Some(phase) = scan.phase() else {
            return Ok(Reconciled::Done);
        };
        if phase == ScanPhase::Done {
            return self.done(&scan, false).await;
        }
        // Scans with an invalid type are finished during validation.
        let Ok(scan_type) = scan.scan_type() else {
            return Ok(Reconciled::Done);
        };

        let handler = handler::for_scan(self.context(), &scan, scan_type).await?;
        debug!(targets = handler.targets().len(), "Validating scan");
        if let Validity::Invalid(verdict) = handler.validate().await {
            self.reject(&scan, verdict).await?;
            return Ok(Reconciled::Done);
        }
        let handler = &*handler;

        info!(%phase, "Reconciling");
        match phase {
            ScanPhase::Pending => self.pending(&scan).await,
            ScanPhase::Launching => self.launching(&scan, handler).await,
            ScanPhase::Running => self.running(&scan, handler).await,
            ScanPhase::Aggregating => self.aggregating(&scan, handler).await,
            ScanPhase::Done | ScanPhase::Unknown => {
                debug!(%phase, "Nothing to do");
                Ok(Reconciled::Done)
            }
        }
    }

    /// Applies defaults and rejects invalid scans. Returns the outcome of the pass when it
    /// should stop here.
    async fn validate(&self, scan: &ComplianceScan) -> Result<Option<Reconciled>> {
        let requeue = Some(Reconciled::RequeueAfter(self.config.requeue_after));

        if scan.phase().is_none() {
            let now = now();
            let mut status = scan.status_or_default();
            status.phase = Some(ScanPhase::Pending);
            status.remaining_retries = scan.max_retries();
            status.start_timestamp = Some(now.clone());
            status.set_condition_pending(&now);
            self.write_status(scan, status).await?;
            info!("Scan is pending");
            return Ok(requeue);
        }

        let mut defaulted = scan.clone();
        let spec = &mut defaulted.spec;
        if spec.scan_type.is_none() {
            spec.scan_type = Some(ScanType::Node.to_string());
        }
        if spec.raw_result_storage.size.is_none() {
            spec.raw_result_storage.size = Some(DEFAULT_RAW_STORAGE_SIZE.to_string());
        }
        if spec.raw_result_storage.pv_access_modes.is_empty() {
            spec.raw_result_storage.pv_access_modes = vec![DEFAULT_ACCESS_MODE.to_string()];
        }
        if defaulted.spec != scan.spec {
            self.store.replace_scan(&defaulted).await?;
            debug!("Applied defaults");
            return Ok(requeue);
        }

        if scan.phase() == Some(ScanPhase::Done) {
            return Ok(None);
        }

        if let Err(error) = scan.scan_type() {
            info!(%error, "Invalid scan type");
            self.events
                .publish(
                    scan,
                    ScanEvent::warning(reason::INVALID_SCAN_TYPE, "The scan type was invalid"),
                )
                .await;
            self.reject(scan, Verdict::error(error.to_string())).await?;
            return Ok(Some(Reconciled::Done));
        }

        if let Some(size) = scan.spec.raw_result_storage.size.as_deref() {
            if let Err(error) = quantity::validate(size) {
                info!(%error, "Invalid raw result storage size");
                let message = format!("Error parsing RawResultsStorageSize: {error}");
                self.reject(scan, Verdict::error(message)).await?;
                return Ok(Some(Reconciled::Done));
            }
        }

        Ok(None)
    }

    /// Finishes a scan that cannot run.
    async fn reject(&self, scan: &ComplianceScan, verdict: Verdict) -> Result<()> {
        let now = now();
        let mut status = scan.status_or_default();
        status.phase = Some(ScanPhase::Done);
        status.result = Some(verdict.result);
        status.error_message = verdict.error;
        status.end_timestamp = Some(now.clone());
        if verdict.result == ScanResult::NotApplicable {
            status.set_condition_ready(&now);
        } else {
            status.set_condition_invalid(&now);
        }
        self.finish(scan, status).await?;
        Ok(())
    }

    /// Cleans up after a scan that is going away and releases it.
    async fn delete(&self, mut scan: ComplianceScan) -> Result<Reconciled> {
        if !scan.has_finalizer() {
            return Ok(Reconciled::Done);
        }
        info!("Cleaning up deleted scan");

        // A deleted scan is never rescanned.
        scan.annotations_mut().remove(labels::RESCAN_ANNOTATION);
        self.done(&scan, true).await?;

        let ns = &self.config.operator_namespace;
        self.store
            .delete_config_maps(ns, &Selector::for_scan(&scan.name_any()))
            .await?;
        self.prerequisites.remove_storage(&scan).await?;

        scan.finalizers_mut().retain(|f| f != labels::SCAN_FINALIZER);
        self.store.replace_scan(&scan).await?;
        debug!("Removed finalizer");
        Ok(Reconciled::Done)
    }

    fn context(&self) -> Context<'_> {
        Context {
            store: &*self.store,
            events: &*self.events,
            config: &self.config,
        }
    }

    async fn write_status(
        &self,
        scan: &ComplianceScan,
        status: ComplianceScanStatus,
    ) -> Result<ComplianceScan> {
        let (phase, result) = (status.phase, status.result);
        let mut updated = scan.clone();
        updated.status = Some(status);
        let written = self.store.replace_scan_status(&updated).await?;
        self.metrics.inc_status(&scan.name_any(), phase, result);
        Ok(written)
    }

    /// Writes a final status and announces the result.
    async fn finish(
        &self,
        scan: &ComplianceScan,
        status: ComplianceScanStatus,
    ) -> Result<ComplianceScan> {
        let written = self.write_status(scan, status).await?;
        self.publish_result(&written).await;
        Ok(written)
    }

    async fn publish_result(&self, scan: &ComplianceScan) {
        let Some(result) = scan.status.as_ref().and_then(|s| s.result) else {
            return;
        };

        self.events
            .publish(
                scan,
                ScanEvent::normal(
                    reason::RESULT_AVAILABLE,
                    format!("ComplianceScan's result is: {result}"),
                ),
            )
            .await;
        match result {
            ScanResult::NotApplicable => {
                self.events
                    .publish(
                        scan,
                        ScanEvent::warning(
                            reason::NOT_APPLICABLE,
                            "The scan did not apply to any target, check the profile and the nodeSelector",
                        ),
                    )
                    .await
            }
            ScanResult::Inconsistent => {
                self.events
                    .publish(
                        scan,
                        ScanEvent::normal(
                            reason::NOT_CONSISTENT,
                            "The scan results were not consistent across targets",
                        ),
                    )
                    .await
            }
            _ => {}
        }

        let namespace = scan.namespace().unwrap_or_default();
        match self.store.has_outdated_remediations(&namespace).await {
            Ok(true) => {
                self.events
                    .publish(
                        scan,
                        ScanEvent::normal(
                            reason::OUTDATED_REMEDIATIONS,
                            format!(
                                "There are remediations labeled {} that should be removed",
                                labels::OUTDATED_REMEDIATION
                            ),
                        ),
                    )
                    .await
            }
            Ok(false) => {}
            Err(error) => warn!(%error, "Failed to check for outdated remediations"),
        }
    }
}
