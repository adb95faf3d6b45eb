//! Audit trail of remote side effects.
//!
//! Every dashboard created or deleted in Instana, and every failed reconcile,
//! is recorded on the `audit` tracing target with the resource identity and
//! remote id as related objects.

use tracing::{info, warn};

use crate::resource::ObjectKey;

/// Operator audit logger.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    component: String,
}

impl AuditLogger {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
        }
    }

    pub fn dashboard_created(&self, key: &ObjectKey, dashboard_id: &str, title: &str) {
        let objects = [key.to_string(), dashboard_id.to_string()];
        info!(
            target: "audit",
            component = %self.component,
            objects = ?objects,
            "Dashboard created in Instana: {} ({})",
            title,
            dashboard_id
        );
    }

    pub fn dashboard_deleted(&self, key: &ObjectKey, dashboard_id: &str, already_gone: bool) {
        let objects = [key.to_string(), dashboard_id.to_string()];
        if already_gone {
            info!(
                target: "audit",
                component = %self.component,
                objects = ?objects,
                "Dashboard {} was already absent in Instana",
                dashboard_id
            );
        } else {
            info!(
                target: "audit",
                component = %self.component,
                objects = ?objects,
                "Dashboard deleted in Instana: {}",
                dashboard_id
            );
        }
    }

    pub fn dashboard_abandoned(&self, key: &ObjectKey, dashboard_id: &str, reason: &str) {
        let objects = [key.to_string(), dashboard_id.to_string()];
        warn!(
            target: "audit",
            component = %self.component,
            objects = ?objects,
            "Dashboard {} may be left in Instana without a resource: {}",
            dashboard_id,
            reason
        );
    }

    pub fn reconcile_failed(&self, key: &ObjectKey, error: &str, retry_in_ms: u64) {
        let objects = [key.to_string()];
        warn!(
            target: "audit",
            component = %self.component,
            objects = ?objects,
            "Reconcile failed, retrying in {}ms: {}",
            retry_in_ms,
            error
        );
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new("operator")
    }
}
