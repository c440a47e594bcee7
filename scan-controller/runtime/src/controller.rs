use crate::{
    k8s::{labels, ComplianceScan, Pod, ResourceExt},
    lease::LEASE_DURATION,
    scan::{Error, Reconciled, Reconciler},
};
use futures::prelude::*;
use kube::{
    runtime::{controller::Action, reflector::ObjectRef, watcher, Controller},
    Api,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Delay before retrying a pass that lost a write race.
const CONFLICT_BACKOFF: Duration = Duration::from_secs(1);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub(crate) struct Context {
    reconciler: Reconciler,
    claims: watch::Receiver<Arc<kubert::lease::Claim>>,
    hostname: String,
}

// === impl Context ===

impl Context {
    pub(crate) fn new(
        reconciler: Reconciler,
        claims: watch::Receiver<Arc<kubert::lease::Claim>>,
        hostname: String,
    ) -> Self {
        Self {
            reconciler,
            claims,
            hostname,
        }
    }

    fn is_leader(&self) -> bool {
        self.claims.borrow().is_current_for(&self.hostname)
    }
}

/// Runs the scan controller until shutdown is signaled.
///
/// Scans are watched cluster-wide. Changes to execution units in the operator namespace trigger
/// a pass for the scan named by their labels.
pub(crate) async fn run(
    client: kube::Client,
    operator_namespace: String,
    ctx: Context,
    drain: drain::Watch,
) {
    let scans = Api::<ComplianceScan>::all(client.clone());
    let pods = Api::<Pod>::namespaced(client, &operator_namespace);

    let (close_tx, close_rx) = tokio::sync::oneshot::channel::<()>();
    let controller = Controller::new(scans, watcher::Config::default())
        .watches(
            pods,
            watcher::Config::default().labels(labels::SCAN_NAME),
            |pod| scan_for_unit(&pod),
        )
        .graceful_shutdown_on(close_rx.map(|_| {}))
        .run(reconcile, error_policy, Arc::new(ctx))
        .for_each(|res| async move {
            match res {
                Ok((scan, _)) => debug!(%scan, "Reconciled"),
                Err(error) => debug!(%error, "Controller error"),
            }
        });
    tokio::pin!(controller);

    info!("Scan controller running");
    tokio::select! {
        _ = (&mut controller) => {}
        handle = drain.signaled() => {
            let _ = close_tx.send(());
            handle.release_after(controller).await;
        }
    }
}

/// Routes an execution unit back to the scan that owns it. Units without a namespace label
/// belong to a scan in their own namespace.
fn scan_for_unit(pod: &Pod) -> Option<ObjectRef<ComplianceScan>> {
    let unit_labels = pod.labels();
    let name = unit_labels.get(labels::SCAN_NAME)?;
    let namespace = unit_labels
        .get(labels::SCAN_NAMESPACE)
        .cloned()
        .or_else(|| pod.namespace())?;
    Some(ObjectRef::new(name).within(&namespace))
}

async fn reconcile(scan: Arc<ComplianceScan>, ctx: Arc<Context>) -> Result<Action, Error> {
    if !ctx.is_leader() {
        return Ok(Action::requeue(LEASE_DURATION));
    }
    let Some(namespace) = scan.namespace() else {
        return Ok(Action::await_change());
    };

    let action = match ctx.reconciler.reconcile(&namespace, &scan.name_any()).await? {
        Reconciled::Done => Action::await_change(),
        Reconciled::RequeueAfter(delay) => Action::requeue(delay),
    };
    Ok(action)
}

fn error_policy(scan: Arc<ComplianceScan>, error: &Error, ctx: Arc<Context>) -> Action {
    ctx.reconciler.record_error(error);
    match error {
        Error::Conflict => {
            debug!(scan = %scan.name_any(), "Scan changed during reconcile; retrying");
            Action::requeue(CONFLICT_BACKOFF)
        }
        error => {
            warn!(scan = %scan.name_any(), %error, "Failed to reconcile scan");
            Action::requeue(ERROR_BACKOFF)
        }
    }
}
