//! Store trait definitions.
//!
//! The reconciler only needs `get`, `update_status` and `update_metadata`.
//! The remaining operations back the REST API and the controller.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::error::Result;
use super::event::Event;
use crate::resource::{Dashboard, ObjectKey};

/// Request to create a new Dashboard.
#[derive(Debug, Clone)]
pub struct CreateDashboardRequest {
    pub namespace: String,
    pub name: String,
    pub config: String,
}

/// Store trait for Dashboard operations.
#[async_trait]
pub trait DashboardStore: Send + Sync {
    /// Get a Dashboard by identity.
    async fn get(&self, key: &ObjectKey) -> Result<Option<Dashboard>>;

    /// List all Dashboards across namespaces.
    async fn list(&self) -> Result<Vec<Dashboard>>;

    /// Create a new Dashboard in the Pending phase.
    async fn create(&self, req: CreateDashboardRequest) -> Result<Dashboard>;

    /// Request deletion.
    ///
    /// Sets the deletion timestamp. A Dashboard without finalizers is removed
    /// right away and `None` is returned.
    async fn request_deletion(&self, key: &ObjectKey) -> Result<Option<Dashboard>>;

    /// Persist `status`. Fails with `VersionMismatch` if the resource version is stale.
    async fn update_status(&self, dashboard: &Dashboard) -> Result<Dashboard>;

    /// Persist `spec` and `metadata.finalizers`. Fails with `VersionMismatch`
    /// if the resource version is stale.
    ///
    /// Once deletion was requested and the last finalizer is gone, the
    /// Dashboard is removed from the store.
    async fn update_metadata(&self, dashboard: &Dashboard) -> Result<Dashboard>;
}

/// Store with change notifications.
pub trait DataStore: DashboardStore + Send + Sync {
    /// Subscribe to change events.
    fn subscribe(&self) -> broadcast::Receiver<Event>;
}
