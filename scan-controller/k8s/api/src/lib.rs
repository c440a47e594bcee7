#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod conditions;
pub mod duration;
pub mod dynamic;
pub mod labels;
pub mod quantity;
mod scan;

pub use self::{
    conditions::{PROCESSING_CONDITION, READY_CONDITION},
    labels::Selector,
    scan::{
        ComplianceScan, ComplianceScanSpec, ComplianceScanStatus, RawResultStorage,
        DEFAULT_ACCESS_MODE, DEFAULT_MAX_RETRIES, DEFAULT_RAW_STORAGE_SIZE,
    },
};
pub use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{
            ConfigMap, Container, Node, PersistentVolumeClaim, Pod, PodSpec, PodStatus, Secret,
            Toleration,
        },
        scheduling::v1::PriorityClass,
    },
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
};
pub use kube::api::{ObjectMeta, ResourceExt};

/// Returns the current time as an API timestamp.
pub fn now() -> Time {
    Time(k8s_openapi::chrono::Utc::now())
}
