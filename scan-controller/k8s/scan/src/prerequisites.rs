use crate::{Result, Store};
use async_trait::async_trait;
use compliance_scan_controller_core::names;
use compliance_scan_controller_k8s_api::{
    labels, ComplianceScan, ObjectMeta, PersistentVolumeClaim, ResourceExt, Selector,
    DEFAULT_ACCESS_MODE, DEFAULT_RAW_STORAGE_SIZE,
};
use k8s_openapi::{
    api::core::v1::{PersistentVolumeClaimSpec, VolumeResourceRequirements},
    apimachinery::pkg::api::resource::Quantity,
};
use maplit::btreemap;
use std::sync::Arc;
use tracing::debug;

/// Objects shared by all of a scan's execution units.
#[async_trait]
pub trait Prerequisites: Send + Sync {
    /// Creates whatever the units need before they can start. Returns false when the units
    /// should not be launched yet.
    async fn ensure(&self, scan: &ComplianceScan) -> Result<bool>;

    /// Quiesces the prerequisites of a scan whose units are kept for debugging.
    async fn suspend(&self, scan: &ComplianceScan) -> Result<()>;

    /// Removes the prerequisites once the scan is finished.
    async fn teardown(&self, scan: &ComplianceScan) -> Result<()>;

    /// Removes the raw result storage. Only done when the scan itself goes away.
    async fn remove_storage(&self, scan: &ComplianceScan) -> Result<()>;
}

/// [`Prerequisites`] kept as labeled objects in the operator namespace.
pub struct StorePrerequisites {
    store: Arc<dyn Store>,
    namespace: String,
}

// === impl StorePrerequisites ===

impl StorePrerequisites {
    pub fn new(store: Arc<dyn Store>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    fn raw_result_claim(&self, scan: &ComplianceScan) -> PersistentVolumeClaim {
        let name = scan.name_any();
        let storage = &scan.spec.raw_result_storage;
        let size = storage
            .size
            .clone()
            .unwrap_or_else(|| DEFAULT_RAW_STORAGE_SIZE.to_string());
        let access_modes = if storage.pv_access_modes.is_empty() {
            vec![DEFAULT_ACCESS_MODE.to_string()]
        } else {
            storage.pv_access_modes.clone()
        };

        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(names::raw_results_name(&name)),
                namespace: Some(self.namespace.clone()),
                labels: Some(Selector::for_scan(&name).labels()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(access_modes),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(btreemap! { "storage".to_string() => Quantity(size) }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn result_server(scan: &ComplianceScan) -> Selector {
        Selector::for_scan(&scan.name_any())
            .with(labels::WORKLOAD, labels::RESULT_SERVER_WORKLOAD)
    }
}

#[async_trait]
impl Prerequisites for StorePrerequisites {
    async fn ensure(&self, scan: &ComplianceScan) -> Result<bool> {
        let claim = self.raw_result_claim(scan);
        debug!(claim = ?claim.metadata.name, "Ensuring raw result storage");
        self.store.create_pvc(&self.namespace, &claim).await?;
        Ok(true)
    }

    async fn suspend(&self, scan: &ComplianceScan) -> Result<()> {
        self.store
            .scale_deployments(&self.namespace, &Self::result_server(scan), 0)
            .await
    }

    async fn teardown(&self, scan: &ComplianceScan) -> Result<()> {
        let name = scan.name_any();
        let ns = &self.namespace;
        self.store
            .delete_deployments(ns, &Self::result_server(scan))
            .await?;
        self.store
            .delete_secrets(ns, &Selector::for_scan(&name))
            .await?;
        self.store
            .delete_config_maps(ns, &Selector::for_scan(&name).with(labels::SCRIPT, ""))
            .await?;
        self.store
            .delete_config_maps(
                ns,
                &Selector::for_scan(&name).with(labels::KUBELET_CONFIG, ""),
            )
            .await
    }

    async fn remove_storage(&self, scan: &ComplianceScan) -> Result<()> {
        self.store
            .delete_pvcs(&self.namespace, &Selector::for_scan(&scan.name_any()))
            .await
    }
}
