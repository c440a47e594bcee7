//! Resources this controller only reads, accessed without generated types.

use kube::api::{ApiResource, GroupVersionKind};

pub const GROUP: &str = "compliance.openshift.io";
pub const VERSION: &str = "v1alpha1";

/// Per-rule results produced by the aggregator.
pub fn check_results() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(GROUP, VERSION, "ComplianceCheckResult"))
}

pub fn remediations() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(GROUP, VERSION, "ComplianceRemediation"))
}
