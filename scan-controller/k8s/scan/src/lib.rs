//! Reconciles `ComplianceScan` resources.
//!
//! A scan is driven through its phases one pass at a time. Every pass reloads the scan, performs
//! at most a handful of idempotent side effects, writes a new status carrying the resource version
//! it was derived from, and tells the caller whether and when to run again. Cluster access goes
//! through the [`Store`], [`EventSink`] and [`Prerequisites`] seams so that the whole state machine
//! runs against in-memory fakes in tests.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod error;
mod events;
mod handler;
mod metrics;
mod prerequisites;
mod reconcile;
mod store;
mod workload;


pub use self::{
    error::{Error, Result, WorkloadError},
    events::{EventSink, KubeEvents, ScanEvent},
    metrics::ScanMetrics,
    prerequisites::{Prerequisites, StorePrerequisites},
    reconcile::{Reconciled, Reconciler},
    store::{KubeStore, Store},
};

use std::time::Duration;

pub const DEFAULT_REQUEUE_AFTER: Duration = Duration::from_secs(10);

/// Static settings shared by every reconcile.
#[derive(Clone, Debug)]
pub struct Config {
    /// Namespace holding execution units, result records and raw result storage.
    pub operator_namespace: String,
    pub scanner_image: String,
    pub aggregator_image: String,
    /// Used when a scan does not name its own content image.
    pub content_image: String,
    pub requeue_after: Duration,
}
