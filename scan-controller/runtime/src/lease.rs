use crate::k8s::{labels, Deployment, ObjectMeta};
use anyhow::Result;
use k8s_openapi::api::coordination::v1 as coordv1;
use kube::{
    api::{Patch, PatchParams},
    Api, Resource,
};
use std::sync::Arc;
use tokio::{sync::watch, time};

pub(crate) const LEASE_DURATION: time::Duration = time::Duration::from_secs(30);
const LEASE_NAME: &str = "compliance-scan-controller-write";
const RENEW_GRACE_PERIOD: time::Duration = time::Duration::from_secs(1);
const FIELD_MANAGER: &str = "compliance-scan-controller";

pub async fn init<T>(
    runtime: &kubert::Runtime<T>,
    ns: &str,
    deployment_name: &str,
    hostname: &str,
) -> Result<watch::Receiver<Arc<kubert::lease::Claim>>> {
    // The operator deployment owns the Lease so that it is removed along with the operator.
    let api = Api::<Deployment>::namespaced(runtime.client(), ns);
    let deployment = api.get(deployment_name).await?;

    let lease = coordv1::Lease {
        metadata: ObjectMeta {
            name: Some(LEASE_NAME.to_string()),
            namespace: Some(ns.to_string()),
            // Specifying a resource version of "0" means that we will
            // only create the Lease if it does not already exist.
            resource_version: Some("0".to_string()),
            owner_references: deployment.controller_owner_ref(&()).map(|owner| vec![owner]),
            labels: Some(
                [(labels::WORKLOAD.to_string(), "scan-controller".to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        },
        spec: None,
    };
    let api = Api::<coordv1::Lease>::namespaced(runtime.client(), ns);
    match api
        .patch(
            LEASE_NAME,
            &PatchParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            },
            &Patch::Apply(lease),
        )
        .await
    {
        Ok(lease) => tracing::info!(?lease, "Created Lease resource"),
        Err(error) if already_exists(&error) => {
            tracing::debug!("Lease already exists, no need to create it")
        }
        Err(error) => {
            return Err(error.into());
        }
    };

    // Only the holder of the write lease reconciles scans.
    let params = kubert::lease::ClaimParams {
        lease_duration: LEASE_DURATION,
        renew_grace_period: RENEW_GRACE_PERIOD,
    };
    let (claims, _task) = kubert::lease::LeaseManager::init(api, LEASE_NAME)
        .await?
        .spawn(hostname, params)
        .await?;
    Ok(claims)
}

/// Applying a Lease with resource version "0" conflicts when the Lease already exists.
fn already_exists(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(rsp) if rsp.code == 409)
}
