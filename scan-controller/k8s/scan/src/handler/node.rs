use super::{Context, Poll, Readiness, ScanTypeHandler, Target, Units, Validity};
use crate::{
    events::{reason, ScanEvent},
    workload::Subject,
    Result, WorkloadError,
};
use async_trait::async_trait;
use compliance_scan_controller_core::{
    aggregate::{Aggregate, Verdict},
    ScanResult,
};
use compliance_scan_controller_k8s_api::{ComplianceScan, ResourceExt, Selector};
use tracing::info;

/// Runs one scanner on every Linux node matching the scan's node selector.
pub(super) struct NodeHandler<'a> {
    units: Units<'a>,
}

// === impl NodeHandler ===

impl<'a> NodeHandler<'a> {
    pub(super) async fn new(ctx: Context<'a>, scan: &'a ComplianceScan) -> Result<Self> {
        let selector = Selector::for_nodes(scan.spec.node_selector.as_ref());
        let targets = ctx
            .store
            .list_nodes(&selector)
            .await?
            .into_iter()
            .map(|node| Target {
                unschedulable: node
                    .spec
                    .as_ref()
                    .and_then(|s| s.unschedulable)
                    .unwrap_or(false),
                name: node.name_any(),
            })
            .collect();
        let strict = scan.spec.strict_node_scan;
        Ok(Self {
            units: Units::new(ctx, scan, targets, strict),
        })
    }

    /// A handler with no targets, for scans that are only being cleaned up.
    pub(super) fn unresolved(ctx: Context<'a>, scan: &'a ComplianceScan) -> Self {
        Self {
            units: Units::new(ctx, scan, Vec::new(), scan.spec.strict_node_scan),
        }
    }

    async fn reject(&self, reason: &'static str, note: String, verdict: Verdict) -> Validity {
        self.units
            .ctx
            .events
            .publish(self.units.scan, ScanEvent::warning(reason, note))
            .await;
        Validity::Invalid(verdict)
    }
}

#[async_trait]
impl ScanTypeHandler for NodeHandler<'_> {
    fn targets(&self) -> &[Target] {
        &self.units.targets
    }

    async fn validate(&self) -> Validity {
        if self.units.targets.is_empty() {
            info!("No nodes matched the nodeSelector");
            return self
                .reject(
                    reason::NO_MATCHING_NODES,
                    "No nodes matched the nodeSelector".to_string(),
                    Verdict::new(ScanResult::NotApplicable),
                )
                .await;
        }

        if self.units.strict {
            if let Some(node) = self.units.targets.iter().find(|t| t.unschedulable) {
                info!(node = %node.name, "Not continuing scan: Node is unschedulable");
                let message = format!("Not continuing scan: Node is unschedulable: {}", node.name);
                return self
                    .reject(
                        reason::UNSCHEDULABLE_NODE,
                        message.clone(),
                        Verdict::error(message),
                    )
                    .await;
            }
        }

        self.units.validate_timeout().await
    }

    async fn create_workload(&self) -> std::result::Result<(), WorkloadError> {
        self.units
            .create_workload(|target| Subject::Node(&target.name))
            .await
    }

    async fn poll_running(&self) -> Result<Poll> {
        self.units.poll_running().await
    }

    async fn ready_to_aggregate(&self) -> Result<Readiness> {
        self.units.ready_to_aggregate().await
    }

    async fn gather_result(&self) -> Result<Aggregate> {
        self.units.gather_result().await
    }

    async fn cleanup(&self) -> Result<()> {
        self.units.cleanup().await
    }
}
