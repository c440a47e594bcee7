use crate::{
    controller::{self, Context},
    core::SCAN_CONTROLLER_NAME,
    lease,
    scan::{
        Config, KubeEvents, KubeStore, Reconciler, ScanMetrics, Store, StorePrerequisites,
        DEFAULT_REQUEUE_AFTER,
    },
};
use anyhow::{bail, Context as _, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "scan-controller", about = "A compliance scan controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "compliance=info,warn",
        env = "COMPLIANCE_SCAN_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Namespace holding execution units, result records and raw result storage.
    #[clap(long, default_value = "openshift-compliance", env = "OPERATOR_NAMESPACE")]
    operator_namespace: String,

    /// Deployment that owns the controller's write lease.
    #[clap(long, default_value = "compliance-operator")]
    controller_deployment_name: String,

    #[clap(
        long,
        default_value = "ghcr.io/complianceascode/openscap-ocp:latest",
        env = "RELATED_IMAGE_OPENSCAP"
    )]
    scanner_image: String,

    #[clap(
        long,
        default_value = "ghcr.io/complianceascode/compliance-operator:latest",
        env = "RELATED_IMAGE_OPERATOR"
    )]
    aggregator_image: String,

    /// Content image used by scans that do not name one.
    #[clap(
        long,
        default_value = "ghcr.io/complianceascode/k8scontent:latest",
        env = "RELATED_IMAGE_PROFILE"
    )]
    content_image: String,

    /// Delay between passes over a scan that is waiting on its execution units.
    #[clap(long, default_value_t = DEFAULT_REQUEUE_AFTER.as_millis() as u64)]
    requeue_after_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            operator_namespace,
            controller_deployment_name,
            scanner_image,
            aggregator_image,
            content_image,
            requeue_after_ms,
        } = self;

        let mut prom = <Registry>::default();
        let metrics = ScanMetrics::register(prom.sub_registry_with_prefix("compliance_scan"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let hostname =
            std::env::var("HOSTNAME").context("Failed to fetch `HOSTNAME` environment variable")?;

        let claims = lease::init(
            &runtime,
            &operator_namespace,
            &controller_deployment_name,
            &hostname,
        )
        .await?;

        let config = Arc::new(Config {
            operator_namespace: operator_namespace.clone(),
            scanner_image,
            aggregator_image,
            content_image,
            requeue_after: Duration::from_millis(requeue_after_ms),
        });
        let store: Arc<dyn Store> = Arc::new(KubeStore::new(runtime.client()));
        let events = KubeEvents::new(
            runtime.client(),
            SCAN_CONTROLLER_NAME,
            Some(hostname.clone()),
        );
        let prerequisites = StorePrerequisites::new(store.clone(), operator_namespace.clone());
        let reconciler = Reconciler::new(
            store,
            Arc::new(events),
            Arc::new(prerequisites),
            metrics,
            config,
        );

        tokio::spawn(
            controller::run(
                runtime.client(),
                operator_namespace,
                Context::new(reconciler, claims, hostname),
                runtime.shutdown_handle(),
            )
            .instrument(info_span!("scans")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
