//! Reconcilers.
//!
//! A reconciler loads the current state of a resource, compares it with the
//! remote system of record and takes at most one action to converge.

pub mod dashboard;

pub use dashboard::{DashboardReconciler, Plan, plan};

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::clients::ClientError;
use crate::config::ConfigError;
use crate::resource::ObjectKey;
use crate::store::StoreError;

/// What a reconcile did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The resource is not in the store.
    Absent,
    /// Nothing to do.
    Unchanged,
    /// A remote dashboard was created and recorded.
    Created { dashboard_id: String },
    /// The finalizer was missing on a provisioned resource and was added.
    FinalizerRepaired,
    /// The remote dashboard is gone and the finalizer was removed.
    Finalized,
}

/// Errors returned by a reconcile. All of them are retryable by the caller.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The resource changed or vanished underneath a write.
    #[error("conflict: {0}")]
    Conflict(#[source] StoreError),

    #[error("store: {0}")]
    Store(#[source] StoreError),

    /// Remote service unavailable, rejected the request, or sent garbage.
    #[error("remote: {0}")]
    Remote(#[from] ClientError),

    #[error("credentials: {0}")]
    Credentials(#[from] ConfigError),

    /// A remote dashboard was created but its id could not be stored.
    #[error("dashboard {dashboard_id} could not be recorded: {reason}")]
    Unrecorded { dashboard_id: String, reason: String },

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
}

impl From<StoreError> for ReconcileError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionMismatch { .. } | StoreError::NotFound(_) => {
                ReconcileError::Conflict(e)
            }
            other => ReconcileError::Store(other),
        }
    }
}

impl ReconcileError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::Conflict(_))
    }
}

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Reconcile the resource identified by `key`. Every I/O call made on the
    /// way is bounded by `deadline`.
    async fn reconcile(&self, key: &ObjectKey, deadline: Instant)
    -> Result<Outcome, ReconcileError>;
}
