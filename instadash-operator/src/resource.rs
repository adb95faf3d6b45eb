//! Dashboard resource model.
//!
//! A `Dashboard` is the declarative object users submit to the store. The
//! operator materializes it as a custom dashboard in Instana and records the
//! remote identity in `status`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Finalizer guarding the remote dashboard. Present iff a remote artifact may exist.
pub const DASHBOARD_FINALIZER: &str = "dashboard.custom.instana.io/finalizer";

/// Identity of a resource in the store (namespace + name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Store-managed metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    /// Optimistic concurrency token, bumped by the store on every write.
    pub resource_version: u64,
    pub creation_timestamp: DateTime<Utc>,
    /// Set once when deletion is requested, never cleared.
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finalizers: Vec<String>,
}

/// Desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSpec {
    /// Opaque dashboard definition, forwarded verbatim to the remote service.
    pub config: String,
}

/// Observed state, written by the operator only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatus {
    /// Remote dashboard id. Empty until provisioned.
    #[serde(default)]
    pub dashboard_id: String,
    #[serde(default)]
    pub dashboard_title: String,
}

/// Lifecycle phase derived from the resource's markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Provisioned,
    Deleting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pending => write!(f, "Pending"),
            Phase::Provisioned => write!(f, "Provisioned"),
            Phase::Deleting => write!(f, "Deleting"),
        }
    }
}

/// A Dashboard resource as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub metadata: ObjectMeta,
    pub spec: DashboardSpec,
    #[serde(default)]
    pub status: DashboardStatus,
}

impl Dashboard {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    pub fn is_deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Remote dashboard id, if one has been recorded.
    pub fn dashboard_id(&self) -> Option<&str> {
        let id = self.status.dashboard_id.as_str();
        (!id.is_empty()).then_some(id)
    }

    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .iter()
            .any(|f| f == DASHBOARD_FINALIZER)
    }

    /// Add the dashboard finalizer. Returns false if it was already present.
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.metadata.finalizers.push(DASHBOARD_FINALIZER.to_string());
        true
    }

    /// Remove the dashboard finalizer. Returns false if it was not present.
    pub fn remove_finalizer(&mut self) -> bool {
        let before = self.metadata.finalizers.len();
        self.metadata.finalizers.retain(|f| f != DASHBOARD_FINALIZER);
        self.metadata.finalizers.len() != before
    }

    pub fn phase(&self) -> Phase {
        if self.is_deletion_requested() {
            Phase::Deleting
        } else if self.dashboard_id().is_some() {
            Phase::Provisioned
        } else {
            Phase::Pending
        }
    }
}
