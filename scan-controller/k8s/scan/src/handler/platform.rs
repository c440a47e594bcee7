use super::{Context, Poll, Readiness, ScanTypeHandler, Target, Units, Validity};
use crate::{workload::Subject, Result, WorkloadError};
use async_trait::async_trait;
use compliance_scan_controller_core::{aggregate::Aggregate, names::PLATFORM_TARGET};
use compliance_scan_controller_k8s_api::ComplianceScan;

/// Runs a single scanner against the cluster's own configuration.
pub(super) struct PlatformHandler<'a> {
    units: Units<'a>,
}

impl<'a> PlatformHandler<'a> {
    pub(super) fn new(ctx: Context<'a>, scan: &'a ComplianceScan) -> Self {
        let target = Target {
            name: PLATFORM_TARGET.to_string(),
            unschedulable: false,
        };
        // An unschedulable platform unit fails the scan.
        Self {
            units: Units::new(ctx, scan, vec![target], true),
        }
    }
}

#[async_trait]
impl ScanTypeHandler for PlatformHandler<'_> {
    fn targets(&self) -> &[Target] {
        &self.units.targets
    }

    async fn validate(&self) -> Validity {
        self.units.validate_timeout().await
    }

    async fn create_workload(&self) -> std::result::Result<(), WorkloadError> {
        self.units.create_workload(|_| Subject::Platform).await
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
