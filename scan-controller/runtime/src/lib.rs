#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use compliance_scan_controller_core as core;
pub use compliance_scan_controller_k8s_api as k8s;
pub use compliance_scan_controller_k8s_scan as scan;

mod args;
mod controller;
mod lease;

pub use self::args::Args;
