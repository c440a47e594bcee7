//! Compliance scan domain model
//!
//! Everything in this crate is independent of the Kubernetes API: the phases a scan moves through,
//! the results it may report, how per-target result records are read and aggregated into a single
//! verdict, and how unit timeouts consume a scan's retry budget. The reconciler in the `k8s`
//! crates drives these decisions against the cluster.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod aggregate;
pub mod names;
mod phase;
pub mod record;
pub mod retry;
mod scan_type;

pub use self::{
    phase::{ScanPhase, ScanResult},
    scan_type::{ScanType, UnknownScanType},
};

pub const SCAN_CONTROLLER_NAME: &str = "compliance.openshift.io/scan-controller";

/// Label set on check results whose outcome differed between targets of the same scan.
pub const INCONSISTENT_CHECK_LABEL: &str = "compliance.openshift.io/inconsistent-check";
