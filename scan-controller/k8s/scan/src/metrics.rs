use compliance_scan_controller_core::{ScanPhase, ScanResult};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ScanMetrics {
    status: Family<StatusLabels, Counter>,
    reconcile_errors: Family<ErrorLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct StatusLabels {
    name: String,
    phase: String,
    result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ErrorLabels {
    reason: String,
}

impl ScanMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let status = Family::default();
        prom.register(
            "status",
            "Count of status updates written to scans",
            status.clone(),
        );

        let reconcile_errors = Family::default();
        prom.register(
            "reconcile_errors",
            "Count of failed reconciles by reason",
            reconcile_errors.clone(),
        );

        Self {
            status,
            reconcile_errors,
        }
    }

    pub(crate) fn inc_status(
        &self,
        name: &str,
        phase: Option<ScanPhase>,
        result: Option<ScanResult>,
    ) {
        self.status
            .get_or_create(&StatusLabels {
                name: name.to_string(),
                phase: phase.map(|p| p.to_string()).unwrap_or_default(),
                result: result.map(|r| r.to_string()).unwrap_or_default(),
            })
            .inc();
    }

    pub(crate) fn inc_error(&self, reason: &str) {
        self.reconcile_errors
            .get_or_create(&ErrorLabels {
                reason: reason.to_string(),
            })
            .inc();
    }
}
