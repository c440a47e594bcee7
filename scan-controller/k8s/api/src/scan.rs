use crate::labels;
use compliance_scan_controller_core::{ScanPhase, ScanResult, ScanType, UnknownScanType};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RAW_STORAGE_SIZE: &str = "1Gi";
pub const DEFAULT_ACCESS_MODE: &str = "ReadWriteOnce";

/// Requests a compliance scan of the nodes matching a selector, or of the cluster itself.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "compliance.openshift.io",
    version = "v1alpha1",
    kind = "ComplianceScan",
    status = "ComplianceScanStatus",
    shortname = "scans",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceScanSpec {
    /// Either `Node` or `Platform`. Defaults to `Node`.
    pub scan_type: Option<String>,

    pub content_image: Option<String>,
    pub profile: Option<String>,
    pub content: Option<String>,

    pub node_selector: Option<BTreeMap<String, String>>,

    /// A Go-style duration after which a running unit is considered stuck. Unset or zero
    /// disables the timeout.
    pub timeout: Option<String>,

    pub max_retry_on_timeout: Option<u32>,

    /// Keeps execution units around after the scan is done.
    #[serde(default)]
    pub debug: bool,

    /// Fails the scan when any selected node is unschedulable instead of skipping it.
    #[serde(default)]
    pub strict_node_scan: bool,

    pub priority_class: Option<String>,

    #[serde(default)]
    pub raw_result_storage: RawResultStorage,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawResultStorage {
    pub size: Option<String>,

    #[serde(default, rename = "pvAccessModes")]
    pub pv_access_modes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceScanStatus {
    pub phase: Option<ScanPhase>,
    pub result: Option<ScanResult>,
    pub start_timestamp: Option<Time>,
    pub end_timestamp: Option<Time>,
    pub error_message: Option<String>,
    pub warnings: Option<String>,

    #[serde(default)]
    pub remaining_retries: u32,

    /// Incremented by every rescan.
    #[serde(default)]
    pub current_index: i64,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

// === impl ComplianceScan ===

impl ComplianceScan {
    pub fn scan_type(&self) -> Result<ScanType, UnknownScanType> {
        match self.spec.scan_type.as_deref() {
            None => Ok(ScanType::default()),
            Some(s) => s.parse(),
        }
    }

    pub fn phase(&self) -> Option<ScanPhase> {
        self.status.as_ref()?.phase
    }

    pub fn status_or_default(&self) -> ComplianceScanStatus {
        self.status.clone().unwrap_or_default()
    }

    pub fn max_retries(&self) -> u32 {
        self.spec.max_retry_on_timeout.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers()
            .iter()
            .any(|f| f == labels::SCAN_FINALIZER)
    }

    pub fn needs_rescan(&self) -> bool {
        self.annotations().contains_key(labels::RESCAN_ANNOTATION)
    }

    pub fn timed_out_targets(&self) -> Option<&str> {
        self.annotations()
            .get(labels::TIMEOUT_ANNOTATION)
            .map(String::as_str)
    }
}
