//! Dashboard reconciler - creates and deletes custom dashboards in Instana.
//!
//! The decision is a pure function of the freshly loaded resource (`plan`),
//! so a reconcile can be retried from scratch after any failure:
//!
//! 1. deletion requested: delete the remote dashboard, then drop the finalizer
//! 2. remote id recorded: nothing to do, or re-add a lost finalizer
//! 3. otherwise: create the remote dashboard, record its id in `status`, then
//!    add the finalizer in a second write

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Outcome, ReconcileError, Reconciler};
use crate::audit::AuditLogger;
use crate::clients::{DashboardApi, DeleteOutcome, RemoteDashboard};
use crate::config::{ApiCredentials, CredentialsSource};
use crate::resource::{Dashboard, ObjectKey};
use crate::store::DashboardStore;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Action chosen for a loaded Dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Delete the remote dashboard (if any) and remove the finalizer (if present).
    Finalize,
    /// Provisioned, or deleting with nothing left to clean up.
    Skip,
    /// Provisioned but the finalizer was never persisted.
    RepairFinalizer,
    /// Create the remote dashboard.
    Create,
}

/// Choose the action for `dashboard`.
pub fn plan(dashboard: &Dashboard) -> Plan {
    let provisioned = dashboard.dashboard_id().is_some();

    if dashboard.is_deletion_requested() {
        if provisioned || dashboard.has_finalizer() {
            Plan::Finalize
        } else {
            Plan::Skip
        }
    } else if provisioned {
        if dashboard.has_finalizer() {
            Plan::Skip
        } else {
            Plan::RepairFinalizer
        }
    } else {
        Plan::Create
    }
}

/// Result of recording a freshly created remote dashboard in `status`.
enum Recorded {
    Stored(Dashboard),
    /// The resource already carried a remote id when re-fetched.
    Superseded(Dashboard),
    /// The resource was removed before the id could be recorded.
    Gone,
}

/// Dashboard reconciler that talks to the store and the remote dashboard API.
pub struct DashboardReconciler {
    store: Arc<dyn DashboardStore>,
    api: Arc<dyn DashboardApi>,
    credentials: Arc<dyn CredentialsSource>,
    audit: AuditLogger,
    call_timeout: Duration,
    conflict_retries: u32,
}

impl DashboardReconciler {
    pub fn new(
        store: Arc<dyn DashboardStore>,
        api: Arc<dyn DashboardApi>,
        credentials: Arc<dyn CredentialsSource>,
    ) -> Self {
        Self {
            store,
            api,
            credentials,
            audit: AuditLogger::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    /// Upper bound for a single store or remote call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// How often a stale write is re-fetched and retried before giving up.
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Run `fut` bounded by the call timeout and the reconcile deadline.
    async fn bounded<T, E, F>(
        &self,
        operation: &'static str,
        deadline: Instant,
        fut: F,
    ) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ReconcileError>,
    {
        let limit = deadline.min(Instant::now() + self.call_timeout);
        match tokio::time::timeout_at(limit, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(ReconcileError::Timeout { operation }),
        }
    }

    async fn load_credentials(&self, deadline: Instant) -> Result<ApiCredentials, ReconcileError> {
        self.bounded("load credentials", deadline, self.credentials.load())
            .await
    }

    async fn reconcile_once(
        &self,
        key: &ObjectKey,
        deadline: Instant,
    ) -> Result<Outcome, ReconcileError> {
        let Some(dashboard) = self.bounded("get", deadline, self.store.get(key)).await? else {
            debug!(dashboard = %key, "Dashboard not found, assuming it was deleted");
            return Ok(Outcome::Absent);
        };
        debug!(
            dashboard = %key,
            version = dashboard.metadata.resource_version,
            phase = %dashboard.phase(),
            "Loaded dashboard"
        );

        match plan(&dashboard) {
            Plan::Finalize => self.finalize(dashboard, deadline).await,
            Plan::Skip => {
                debug!(
                    dashboard = %key,
                    dashboard_id = %dashboard.status.dashboard_id,
                    "Nothing to do"
                );
                Ok(Outcome::Unchanged)
            }
            Plan::RepairFinalizer => self.repair_finalizer(dashboard, deadline).await,
            Plan::Create => self.create(dashboard, deadline).await,
        }
    }

    async fn finalize(
        &self,
        mut dashboard: Dashboard,
        deadline: Instant,
    ) -> Result<Outcome, ReconcileError> {
        let key = dashboard.key();

        if let Some(id) = dashboard.dashboard_id().map(str::to_string) {
            info!(dashboard = %key, dashboard_id = %id, "Deleting Instana dashboard");
            let credentials = self.load_credentials(deadline).await?;
            let outcome = self
                .bounded(
                    "delete dashboard",
                    deadline,
                    self.api.delete_dashboard(&credentials, &id),
                )
                .await?;
            self.audit
                .dashboard_deleted(&key, &id, outcome == DeleteOutcome::NotFound);
        }

        if dashboard.remove_finalizer() {
            self.bounded(
                "update metadata",
                deadline,
                self.store.update_metadata(&dashboard),
            )
            .await?;
            info!(dashboard = %key, "Removed finalizer");
        }
        Ok(Outcome::Finalized)
    }

    async fn repair_finalizer(
        &self,
        mut dashboard: Dashboard,
        deadline: Instant,
    ) -> Result<Outcome, ReconcileError> {
        warn!(
            dashboard = %dashboard.key(),
            dashboard_id = %dashboard.status.dashboard_id,
            "Provisioned dashboard has no finalizer, adding it"
        );
        dashboard.add_finalizer();
        self.bounded(
            "update metadata",
            deadline,
            self.store.update_metadata(&dashboard),
        )
        .await?;
        Ok(Outcome::FinalizerRepaired)
    }

    async fn create(
        &self,
        dashboard: Dashboard,
        deadline: Instant,
    ) -> Result<Outcome, ReconcileError> {
        let key = dashboard.key();
        let credentials = self.load_credentials(deadline).await?;

        info!(dashboard = %key, base_url = %credentials.base_url, "Creating Instana dashboard");
        let remote = self
            .bounded(
                "create dashboard",
                deadline,
                self.api
                    .create_dashboard(&credentials, &dashboard.spec.config),
            )
            .await?;
        self.audit
            .dashboard_created(&key, &remote.id, &remote.title);

        let mut recorded = match self.record_status(dashboard, &remote, deadline).await {
            Ok(Recorded::Stored(d)) => d,
            Ok(Recorded::Superseded(d)) => {
                if d.dashboard_id() != Some(remote.id.as_str()) {
                    self.compensate(&key, &credentials, &remote.id, deadline, "superseded")
                        .await;
                }
                // Continue from the recorded id; the fresh object carries one.
                return match plan(&d) {
                    Plan::Finalize => self.finalize(d, deadline).await,
                    Plan::RepairFinalizer => self.repair_finalizer(d, deadline).await,
                    Plan::Skip | Plan::Create => Ok(Outcome::Unchanged),
                };
            }
            Ok(Recorded::Gone) => {
                self.compensate(&key, &credentials, &remote.id, deadline, "resource removed")
                    .await;
                return Ok(Outcome::Absent);
            }
            Err(ReconcileError::Timeout { operation }) => {
                // The write may or may not have landed.
                self.audit
                    .dashboard_abandoned(&key, &remote.id, "status write timed out");
                return Err(ReconcileError::Timeout { operation });
            }
            Err(e) => {
                self.compensate(&key, &credentials, &remote.id, deadline, &e.to_string())
                    .await;
                // A conflict here must not send the reconcile back through `create`.
                return Err(ReconcileError::Unrecorded {
                    dashboard_id: remote.id,
                    reason: e.to_string(),
                });
            }
        };
        info!(
            dashboard = %key,
            dashboard_id = %remote.id,
            version = recorded.metadata.resource_version,
            "Recorded dashboard id in status"
        );

        if recorded.add_finalizer() {
            let updated = match self
                .bounded(
                    "update metadata",
                    deadline,
                    self.store.update_metadata(&recorded),
                )
                .await
            {
                Ok(updated) => updated,
                Err(e) if e.is_conflict() => {
                    // Without a finalizer a deletion removes the resource at once.
                    if self.bounded("get", deadline, self.store.get(&key)).await?.is_none() {
                        self.compensate(&key, &credentials, &remote.id, deadline, "resource removed")
                            .await;
                        return Ok(Outcome::Absent);
                    }
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            debug!(
                dashboard = %key,
                version = updated.metadata.resource_version,
                "Added finalizer"
            );
        }

        Ok(Outcome::Created {
            dashboard_id: remote.id,
        })
    }

    /// Write the remote id into `status`. Stale writes are re-applied onto
    /// the re-fetched resource; the remote create is never repeated.
    async fn record_status(
        &self,
        mut dashboard: Dashboard,
        remote: &RemoteDashboard,
        deadline: Instant,
    ) -> Result<Recorded, ReconcileError> {
        let key = dashboard.key();
        let mut attempt = 0;

        loop {
            dashboard.status.dashboard_id = remote.id.clone();
            dashboard.status.dashboard_title = remote.title.clone();

            let err = match self
                .bounded("update status", deadline, self.store.update_status(&dashboard))
                .await
            {
                Ok(updated) => return Ok(Recorded::Stored(updated)),
                Err(e) if e.is_conflict() && attempt < self.conflict_retries => e,
                Err(e) => return Err(e),
            };
            attempt += 1;
            debug!(dashboard = %key, attempt, error = %err, "Status write conflicted, re-fetching");

            dashboard = match self.bounded("get", deadline, self.store.get(&key)).await? {
                None => return Ok(Recorded::Gone),
                Some(fresh) if fresh.dashboard_id().is_some() => {
                    return Ok(Recorded::Superseded(fresh));
                }
                Some(fresh) => fresh,
            };
        }
    }

    /// Best-effort removal of a remote dashboard that could not be recorded.
    async fn compensate(
        &self,
        key: &ObjectKey,
        credentials: &ApiCredentials,
        dashboard_id: &str,
        deadline: Instant,
        reason: &str,
    ) {
        warn!(dashboard = %key, dashboard_id, reason, "Removing unrecorded Instana dashboard");
        match self
            .bounded(
                "delete dashboard",
                deadline,
                self.api.delete_dashboard(credentials, dashboard_id),
            )
            .await
        {
            Ok(outcome) => {
                self.audit
                    .dashboard_deleted(key, dashboard_id, outcome == DeleteOutcome::NotFound)
            }
            Err(e) => self
                .audit
                .dashboard_abandoned(key, dashboard_id, &e.to_string()),
        }
    }
}

#[async_trait]
impl Reconciler for DashboardReconciler {
    async fn reconcile(
        &self,
        key: &ObjectKey,
        deadline: Instant,
    ) -> Result<Outcome, ReconcileError> {
        let mut attempt = 0;
        loop {
            match self.reconcile_once(key, deadline).await {
                Err(e) if e.is_conflict() && attempt < self.conflict_retries => {
                    attempt += 1;
                    debug!(dashboard = %key, attempt, error = %e, "Conflict, reconciling again");
                }
                result => return result,
            }
        }
    }
}
