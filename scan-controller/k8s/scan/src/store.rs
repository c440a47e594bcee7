use crate::Result;
use async_trait::async_trait;
use compliance_scan_controller_k8s_api::{
    dynamic, labels, ComplianceScan, ConfigMap, Deployment, Node,
    PersistentVolumeClaim, Pod, PriorityClass, ResourceExt, Secret, Selector,
};
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    core::DynamicObject,
};
use serde_json::json;
use tracing::debug;

/// The cluster objects the reconciler reads and writes.
///
/// Reads of absent objects return `None`; creating an object that already exists and deleting
/// one that does not are both successes. Writes carrying a stale resource version fail with
/// [`Error::Conflict`](crate::Error::Conflict).
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_scan(&self, namespace: &str, name: &str) -> Result<Option<ComplianceScan>>;

    /// Writes the scan's metadata and spec.
    async fn replace_scan(&self, scan: &ComplianceScan) -> Result<ComplianceScan>;

    /// Writes the scan's status.
    async fn replace_scan_status(&self, scan: &ComplianceScan) -> Result<ComplianceScan>;

    async fn list_nodes(&self, selector: &Selector) -> Result<Vec<Node>>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<()>;
    async fn delete_pods(&self, namespace: &str, selector: &Selector) -> Result<()>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;
    async fn create_config_map(&self, namespace: &str, cm: &ConfigMap) -> Result<()>;
    async fn delete_config_maps(&self, namespace: &str, selector: &Selector) -> Result<()>;

    async fn delete_secrets(&self, namespace: &str, selector: &Selector) -> Result<()>;

    async fn delete_deployments(&self, namespace: &str, selector: &Selector) -> Result<()>;
    async fn scale_deployments(
        &self,
        namespace: &str,
        selector: &Selector,
        replicas: i32,
    ) -> Result<()>;

    async fn create_pvc(&self, namespace: &str, pvc: &PersistentVolumeClaim) -> Result<()>;
    async fn delete_pvcs(&self, namespace: &str, selector: &Selector) -> Result<()>;

    async fn priority_class_exists(&self, name: &str) -> Result<bool>;

    /// Counts the scan's check results that disagreed between targets.
    async fn count_inconsistent_checks(&self, namespace: &str, scan: &str) -> Result<usize>;

    async fn has_outdated_remediations(&self, namespace: &str) -> Result<bool>;
}

/// A [`Store`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: kube::Client,
}

// === impl KubeStore ===

impl KubeStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn delete_all<K>(&self, namespace: &str, selector: &Selector) -> Result<()>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let params = ListParams::default().labels(&selector.to_string());
        match self
            .api::<K>(namespace)
            .delete_collection(&DeleteParams::background(), &params)
            .await
        {
            Ok(_) => Ok(()),
            Err(error) if is_not_found(&error) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn create<K>(&self, namespace: &str, obj: &K) -> Result<()>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + serde::Serialize
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        match self
            .api::<K>(namespace)
            .create(&PostParams::default(), obj)
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(rsp)) if rsp.reason == "AlreadyExists" => {
                debug!(name = %obj.name_any(), "Already exists");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    fn dynamic(&self, namespace: &str, resource: &kube::api::ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get_scan(&self, namespace: &str, name: &str) -> Result<Option<ComplianceScan>> {
        Ok(self.api::<ComplianceScan>(namespace).get_opt(name).await?)
    }

    async fn replace_scan(&self, scan: &ComplianceScan) -> Result<ComplianceScan> {
        let namespace = scan.namespace().unwrap_or_default();
        let updated = self
            .api::<ComplianceScan>(&namespace)
            .replace(&scan.name_any(), &PostParams::default(), scan)
            .await?;
        Ok(updated)
    }

    async fn replace_scan_status(&self, scan: &ComplianceScan) -> Result<ComplianceScan> {
        let namespace = scan.namespace().unwrap_or_default();
        let patch = json!({
            "metadata": { "resourceVersion": scan.resource_version() },
            "status": serde_json::to_value(&scan.status)?,
        });
        let updated = self
            .api::<ComplianceScan>(&namespace)
            .patch_status(
                &scan.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(updated)
    }

    async fn list_nodes(&self, selector: &Selector) -> Result<Vec<Node>> {
        let params = ListParams::default().labels(&selector.to_string());
        let nodes = Api::<Node>::all(self.client.clone()).list(&params).await?;
        Ok(nodes.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        Ok(self.api::<Pod>(namespace).get_opt(name).await?)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<()> {
        self.create(namespace, pod).await
    }

    async fn delete_pods(&self, namespace: &str, selector: &Selector) -> Result<()> {
        self.delete_all::<Pod>(namespace, selector).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        Ok(self.api::<ConfigMap>(namespace).get_opt(name).await?)
    }

    async fn create_config_map(&self, namespace: &str, cm: &ConfigMap) -> Result<()> {
        self.create(namespace, cm).await
    }

    async fn delete_config_maps(&self, namespace: &str, selector: &Selector) -> Result<()> {
        self.delete_all::<ConfigMap>(namespace, selector).await
    }

    async fn delete_secrets(&self, namespace: &str, selector: &Selector) -> Result<()> {
        self.delete_all::<Secret>(namespace, selector).await
    }

    async fn delete_deployments(&self, namespace: &str, selector: &Selector) -> Result<()> {
        self.delete_all::<Deployment>(namespace, selector).await
    }

    async fn scale_deployments(
        &self,
        namespace: &str,
        selector: &Selector,
        replicas: i32,
    ) -> Result<()> {
        let api = self.api::<Deployment>(namespace);
        let params = ListParams::default().labels(&selector.to_string());
        let patch = json!({ "spec": { "replicas": replicas } });
        for deployment in api.list(&params).await? {
            let current = deployment.spec.as_ref().and_then(|s| s.replicas);
            if current == Some(replicas) {
                continue;
            }
            api.patch(
                &deployment.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        }
        Ok(())
    }

    async fn create_pvc(&self, namespace: &str, pvc: &PersistentVolumeClaim) -> Result<()> {
        self.create(namespace, pvc).await
    }

    async fn delete_pvcs(&self, namespace: &str, selector: &Selector) -> Result<()> {
        self.delete_all::<PersistentVolumeClaim>(namespace, selector)
            .await
    }

    async fn priority_class_exists(&self, name: &str) -> Result<bool> {
        let api = Api::<PriorityClass>::all(self.client.clone());
        Ok(api.get_opt(name).await?.is_some())
    }

    async fn count_inconsistent_checks(&self, namespace: &str, scan: &str) -> Result<usize> {
        let selector = format!(
            "{},{}",
            Selector::for_scan(scan),
            compliance_scan_controller_core::INCONSISTENT_CHECK_LABEL
        );
        let params = ListParams::default().labels(&selector);
        match self
            .dynamic(namespace, &dynamic::check_results())
            .list(&params)
            .await
        {
            Ok(list) => Ok(list.items.len()),
            // The check result resource is not installed.
            Err(error) if is_not_found(&error) => Ok(0),
            Err(error) => Err(error.into()),
        }
    }

    async fn has_outdated_remediations(&self, namespace: &str) -> Result<bool> {
        let params = ListParams::default()
            .labels(labels::OUTDATED_REMEDIATION)
            .limit(1);
        match self
            .dynamic(namespace, &dynamic::remediations())
            .list(&params)
            .await
        {
            Ok(list) => Ok(!list.items.is_empty()),
            Err(error) if is_not_found(&error) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(rsp) if rsp.code == 404)
}
