pub mod audit;
pub mod clients;
pub mod config;
pub mod controller;
pub mod reconciler;
pub mod resource;
pub mod rest;
pub mod store;

pub use audit::AuditLogger;
pub use clients::{DashboardApi, InstanaClient};
pub use config::{ApiCredentials, ConfigMapFile, CredentialsSource, StaticCredentials};
pub use controller::{Controller, ControllerConfig};
pub use reconciler::{DashboardReconciler, Outcome, ReconcileError, Reconciler};
pub use resource::{DASHBOARD_FINALIZER, Dashboard, ObjectKey};
pub use store::{DataStore, MemoryStore, StoreError};
