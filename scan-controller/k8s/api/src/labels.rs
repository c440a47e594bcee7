//! Well-known labels, annotations and the equality selectors built from them.

use std::{collections::BTreeMap, fmt};

pub type Map = BTreeMap<String, String>;

/// Set on every object owned by a scan.
pub const SCAN_NAME: &str = "compliance.openshift.io/scan-name";

/// Set on execution units so that their events can be routed back to the scan.
pub const SCAN_NAMESPACE: &str = "compliance.openshift.io/scan-namespace";

/// Set on the per-target result records.
pub const SCAN_RESULT: &str = "compliance.openshift.io/scan-result";

pub const WORKLOAD: &str = "workload";
pub const SCANNER_WORKLOAD: &str = "scanner";
pub const AGGREGATOR_WORKLOAD: &str = "aggregator";
pub const RESULT_SERVER_WORKLOAD: &str = "resultserver";

pub const SCRIPT: &str = "complianceoperator.openshift.io/scan-script";
pub const KUBELET_CONFIG: &str = "compliance.openshift.io/kubelet-config";
pub const OUTDATED_REMEDIATION: &str = "complianceoperator.openshift.io/outdated-remediation";

pub const HOSTNAME: &str = "kubernetes.io/hostname";
pub const OS: &str = "kubernetes.io/os";

pub const RESCAN_ANNOTATION: &str = "compliance.openshift.io/rescan";
pub const TIMEOUT_ANNOTATION: &str = "compliance.openshift.io/timeout";

pub const SCAN_FINALIZER: &str = "scan.finalizers.compliance.openshift.io";

/// Matches objects carrying all of a set of labels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector(Map);

// === impl Selector ===

impl Selector {
    /// Selects everything owned by a scan.
    pub fn for_scan(scan: &str) -> Self {
        Self::default().with(SCAN_NAME, scan)
    }

    /// Selects the Linux nodes a node scan runs on.
    pub fn for_nodes(node_selector: Option<&Map>) -> Self {
        node_selector
            .into_iter()
            .flatten()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Self>()
            .with(OS, "linux")
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, labels: &Map) -> bool {
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }

    /// The labels an object must carry to be selected.
    pub fn labels(&self) -> Map {
        self.0.clone()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
