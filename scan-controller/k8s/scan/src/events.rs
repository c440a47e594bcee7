use async_trait::async_trait;
use compliance_scan_controller_k8s_api::ComplianceScan;
use kube::{
    runtime::events::{Event, EventType, Recorder, Reporter},
    Resource,
};
use tracing::warn;

pub mod reason {
    pub const INVALID_SCAN_TYPE: &str = "InvalidScanType";
    pub const INVALID_TIMEOUT: &str = "InvalidTimeout";
    pub const NO_MATCHING_NODES: &str = "NoMatchingNodes";
    pub const UNSCHEDULABLE_NODE: &str = "UnschedulableNode";
    pub const PRIORITY_CLASS: &str = "PriorityClass";
    pub const RETRYING: &str = "Retrying";
    pub const RESULT_AVAILABLE: &str = "ResultAvailable";
    pub const NOT_APPLICABLE: &str = "ScanNotApplicable";
    pub const NOT_CONSISTENT: &str = "ScanNotConsistent";
    pub const OUTDATED_REMEDIATIONS: &str = "HaveOutdatedRemediations";
}

/// A human-readable event attached to a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanEvent {
    pub warning: bool,
    pub reason: &'static str,
    pub note: String,
}

/// Publishes events about scans. Publishing is best-effort.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, scan: &ComplianceScan, event: ScanEvent);
}

/// An [`EventSink`] that records Kubernetes events.
pub struct KubeEvents {
    recorder: Recorder,
}

// === impl ScanEvent ===

impl ScanEvent {
    pub fn normal(reason: &'static str, note: impl Into<String>) -> Self {
        Self {
            warning: false,
            reason,
            note: note.into(),
        }
    }

    pub fn warning(reason: &'static str, note: impl Into<String>) -> Self {
        Self {
            warning: true,
            reason,
            note: note.into(),
        }
    }
}

// === impl KubeEvents ===

impl KubeEvents {
    pub fn new(client: kube::Client, controller: &str, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEvents {
    async fn publish(&self, scan: &ComplianceScan, event: ScanEvent) {
        let ScanEvent {
            warning,
            reason,
            note,
        } = event;
        let event = Event {
            type_: if warning {
                EventType::Warning
            } else {
                EventType::Normal
            },
            reason: reason.to_string(),
            note: Some(note),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(error) = self.recorder.publish(&event, &scan.object_ref(&())).await {
            warn!(%error, reason, "Failed to publish event");
        }
    }
}
