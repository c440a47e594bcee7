//! Scan type handlers.
//!
//! A handler knows which targets a scan covers and how to run, watch and collect one execution
//! unit per target. The phase logic drives every scan type through the same [`ScanTypeHandler`]
//! interface.

mod node;
mod platform;

use crate::{
    events::{reason, ScanEvent},
    workload::{self, Subject},
    Config, EventSink, Result, Store, WorkloadError,
};
use async_trait::async_trait;
use compliance_scan_controller_core::{
    aggregate::{self, Aggregate, Verdict},
    names,
    record::ResultRecord,
    retry::{Timeout, UnitState},
    ScanType,
};
use compliance_scan_controller_k8s_api::{
    duration::GoDuration, now, ComplianceScan, ResourceExt,
};
use tracing::{debug, info};

/// Shared access to the cluster for the duration of one reconcile.
#[derive(Copy, Clone)]
pub(crate) struct Context<'a> {
    pub store: &'a dyn Store,
    pub events: &'a dyn EventSink,
    pub config: &'a Config,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Target {
    pub name: String,
    /// The target refuses new workloads.
    pub unschedulable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Validity {
    Valid,
    /// The scan cannot run and finishes with the given verdict.
    Invalid(Verdict),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Poll {
    Running,
    Finished,
    TimedOut(Vec<String>),
    /// The unit for this target does not exist.
    Missing(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Readiness {
    NotReady,
    /// A target has no result and no unit left to write one.
    Missing(String),
    Ready {
        warnings: Option<String>,
    },
    /// A unit failed in a way that leaves nothing to aggregate.
    Failed {
        warnings: Option<String>,
        error: String,
    },
}

#[async_trait]
pub(crate) trait ScanTypeHandler: Send + Sync {
    fn targets(&self) -> &[Target];

    /// Checks that the scan can run, publishing an event when it cannot.
    async fn validate(&self) -> Validity;

    async fn create_workload(&self) -> std::result::Result<(), WorkloadError>;

    async fn poll_running(&self) -> Result<Poll>;

    async fn ready_to_aggregate(&self) -> Result<Readiness>;

    async fn gather_result(&self) -> Result<Aggregate>;

    /// Deletes the execution units.
    async fn cleanup(&self) -> Result<()>;
}

pub(crate) async fn for_scan<'a>(
    ctx: Context<'a>,
    scan: &'a ComplianceScan,
    scan_type: ScanType,
) -> Result<Box<dyn ScanTypeHandler + 'a>> {
    match scan_type {
        ScanType::Node => Ok(Box::new(node::NodeHandler::new(ctx, scan).await?)),
        ScanType::Platform => Ok(Box::new(platform::PlatformHandler::new(ctx, scan))),
    }
}

/// Returns a handler that only cleans up, without resolving the scan's targets.
pub(crate) fn for_cleanup<'a>(
    ctx: Context<'a>,
    scan: &'a ComplianceScan,
    scan_type: ScanType,
) -> Box<dyn ScanTypeHandler + 'a> {
    match scan_type {
        ScanType::Node => Box::new(node::NodeHandler::unresolved(ctx, scan)),
        ScanType::Platform => Box::new(platform::PlatformHandler::new(ctx, scan)),
    }
}

/// Returns the priority class units should use, dropping one that does not exist.
pub(crate) async fn priority_class(
    ctx: Context<'_>,
    scan: &ComplianceScan,
) -> Result<Option<String>> {
    let Some(class) = scan.spec.priority_class.as_deref().filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    if ctx.store.priority_class_exists(class).await? {
        return Ok(Some(class.to_string()));
    }

    let why = format!("Priority class {class} does not exist, launching pods without it.");
    info!(priority_class = %class, "Priority class not found");
    ctx.events
        .publish(
            scan,
            ScanEvent::warning(reason::PRIORITY_CLASS, format!("{why} Scan:{}", scan.name_any())),
        )
        .await;
    Ok(None)
}

/// Per-target bookkeeping shared by every scan type.
struct Units<'a> {
    ctx: Context<'a>,
    scan: &'a ComplianceScan,
    targets: Vec<Target>,
    /// Unschedulable targets fail the scan rather than being skipped.
    strict: bool,
    timeout: std::result::Result<Timeout, String>,
}

// === impl Units ===

impl<'a> Units<'a> {
    fn new(
        ctx: Context<'a>,
        scan: &'a ComplianceScan,
        targets: Vec<Target>,
        strict: bool,
    ) -> Self {
        let timeout = match scan.spec.timeout.as_deref() {
            None | Some("") => Ok(Timeout::DISABLED),
            Some(t) => t
                .parse::<GoDuration>()
                .map(|d| Timeout::new(d.into()))
                .map_err(|e| e.to_string()),
        };
        Self {
            ctx,
            scan,
            targets,
            strict,
            timeout,
        }
    }

    fn name(&self) -> String {
        self.scan.name_any()
    }

    fn namespace(&self) -> &str {
        &self.ctx.config.operator_namespace
    }

    async fn validate_timeout(&self) -> Validity {
        let Err(error) = &self.timeout else {
            return Validity::Valid;
        };
        let message = format!("Cannot parse timeout value: {error}");
        info!(timeout = ?self.scan.spec.timeout, "Invalid timeout");
        self.ctx
            .events
            .publish(
                self.scan,
                ScanEvent::warning(reason::INVALID_TIMEOUT, message.clone()),
            )
            .await;
        Validity::Invalid(Verdict::error(message))
    }

    async fn create_workload(
        &self,
        subject: fn(&Target) -> Subject<'_>,
    ) -> std::result::Result<(), WorkloadError> {
        let priority_class = priority_class(self.ctx, self.scan).await?;
        for target in &self.targets {
            let mut pod = workload::scanner_pod(self.ctx.config, self.scan, subject(target));
            if let Some(spec) = pod.spec.as_mut() {
                spec.priority_class_name = priority_class.clone();
            }
            debug!(pod = ?pod.metadata.name, scan_target = %target.name, "Creating scan pod");
            self.ctx.store.create_pod(self.namespace(), &pod).await?;
        }
        Ok(())
    }

    async fn poll_running(&self) -> Result<Poll> {
        let timeout = self.timeout.clone().unwrap_or(Timeout::DISABLED);
        let now = now();
        let name = self.name();
        let mut running = false;
        let mut timed_out = Vec::new();

        for target in &self.targets {
            let unit = names::unit_name(&name, &target.name);
            let Some(pod) = self.ctx.store.get_pod(self.namespace(), &unit).await? else {
                return Ok(Poll::Missing(target.name.clone()));
            };

            match workload::observe(&pod, &now).state(timeout) {
                UnitState::Finished => {}
                UnitState::Running => running = true,
                UnitState::TimedOut => {
                    info!(scan_target = %target.name, "Timeout while waiting for the scan pod to be finished");
                    timed_out.push(target.name.clone());
                }
                UnitState::Unschedulable(why) => self.record_unschedulable(target, &why).await?,
            }
        }

        if !timed_out.is_empty() {
            return Ok(Poll::TimedOut(timed_out));
        }
        if running {
            return Ok(Poll::Running);
        }
        Ok(Poll::Finished)
    }

    /// Stands in for the result a unit that never runs would have written.
    async fn record_unschedulable(&self, target: &Target, why: &str) -> Result<()> {
        let name = self.name();
        let record = names::result_record_name(&name, &target.name);
        if self
            .ctx
            .store
            .get_config_map(self.namespace(), &record)
            .await?
            .is_some()
        {
            return Ok(());
        }

        info!(scan_target = %target.name, "Scan pod is unschedulable");
        let message = format!("Pod for target {} could not be scheduled: {why}", target.name);
        let cm = workload::unschedulable_record(self.ctx.config, &name, &target.name, &message);
        self.ctx.store.create_config_map(self.namespace(), &cm).await
    }

    async fn records(&self) -> Result<Vec<(&str, Option<ResultRecord>)>> {
        let name = self.name();
        let mut records = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let cm_name = names::result_record_name(&name, &target.name);
            let record = self
                .ctx
                .store
                .get_config_map(self.namespace(), &cm_name)
                .await?
                .map(|cm| ResultRecord::from_data(&cm.data.unwrap_or_default()));
            records.push((target.name.as_str(), record));
        }
        Ok(records)
    }

    async fn ready_to_aggregate(&self) -> Result<Readiness> {
        let mut warnings = None;
        for (scan_target, record) in self.records().await? {
            let Some(record) = record.filter(ResultRecord::is_complete) else {
                let unit = names::unit_name(&self.name(), scan_target);
                if self.ctx.store.get_pod(self.namespace(), &unit).await?.is_none() {
                    return Ok(Readiness::Missing(scan_target.to_string()));
                }
                debug!(%scan_target, "Result record is not ready");
                return Ok(Readiness::NotReady);
            };
            if let Some(w) = record.warnings() {
                warnings = Some(w.to_string());
            }
            if let Some(error) = record.unrecoverable_error() {
                return Ok(Readiness::Failed { warnings, error });
            }
        }
        Ok(Readiness::Ready { warnings })
    }

    async fn gather_result(&self) -> Result<Aggregate> {
        let records = self.records().await?;
        Ok(aggregate::aggregate(
            records.iter().map(|(t, r)| (*t, r.as_ref())),
            self.strict,
        ))
    }

    async fn cleanup(&self) -> Result<()> {
        debug!("Deleting scan pods");
        self.ctx
            .store
            .delete_pods(self.namespace(), &workload::scanner_selector(&self.name()))
            .await
    }
}
