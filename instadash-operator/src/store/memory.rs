//! In-memory store with resource versions, finalizers and deletion GC.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use super::error::{Result, StoreError};
use super::event::Event;
use super::traits::{CreateDashboardRequest, DashboardStore, DataStore};
use crate::resource::{Dashboard, DashboardSpec, DashboardStatus, ObjectKey, ObjectMeta};

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Dashboard>,
    last_version: u64,
}

impl State {
    fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }

    /// Look up the stored object and check the caller's resource version.
    fn current(&self, dashboard: &Dashboard) -> Result<&Dashboard> {
        let key = dashboard.key();
        let stored = self
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if stored.metadata.resource_version != dashboard.metadata.resource_version {
            return Err(StoreError::VersionMismatch {
                expected: stored.metadata.resource_version,
                actual: dashboard.metadata.resource_version,
            });
        }
        Ok(stored)
    }
}

/// Dashboard store kept in process memory.
pub struct MemoryStore {
    state: RwLock<State>,
    events: broadcast::Sender<Event>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: RwLock::new(State::default()),
            events,
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DashboardStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Dashboard>> {
        let state = self.state.read().await;
        Ok(state.objects.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<Dashboard>> {
        let state = self.state.read().await;
        Ok(state.objects.values().cloned().collect())
    }

    async fn create(&self, req: CreateDashboardRequest) -> Result<Dashboard> {
        if req.namespace.is_empty() || req.name.is_empty() {
            return Err(StoreError::Invalid(
                "namespace and name must not be empty".to_string(),
            ));
        }

        let key = ObjectKey::new(&req.namespace, &req.name);
        let mut state = self.state.write().await;
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        let dashboard = Dashboard {
            metadata: ObjectMeta {
                namespace: req.namespace,
                name: req.name,
                uid: uuid::Uuid::new_v4().to_string(),
                resource_version: state.next_version(),
                creation_timestamp: Utc::now(),
                deletion_timestamp: None,
                finalizers: vec![],
            },
            spec: DashboardSpec { config: req.config },
            status: DashboardStatus::default(),
        };
        state.objects.insert(key.clone(), dashboard.clone());
        debug!(dashboard = %key, version = dashboard.metadata.resource_version, "Created");

        self.emit(Event::Added(dashboard.clone()));
        Ok(dashboard)
    }

    async fn request_deletion(&self, key: &ObjectKey) -> Result<Option<Dashboard>> {
        let mut state = self.state.write().await;
        let Some(stored) = state.objects.get(key).cloned() else {
            return Err(StoreError::NotFound(key.to_string()));
        };

        if stored.metadata.finalizers.is_empty() {
            state.objects.remove(key);
            debug!(dashboard = %key, "Removed (no finalizers)");
            self.emit(Event::Deleted(key.clone()));
            return Ok(None);
        }

        if stored.is_deletion_requested() {
            return Ok(Some(stored));
        }

        let mut updated = stored;
        updated.metadata.deletion_timestamp = Some(Utc::now());
        updated.metadata.resource_version = state.next_version();
        state.objects.insert(key.clone(), updated.clone());
        debug!(dashboard = %key, finalizers = ?updated.metadata.finalizers, "Deletion requested");

        self.emit(Event::Modified(updated.clone()));
        Ok(Some(updated))
    }

    async fn update_status(&self, dashboard: &Dashboard) -> Result<Dashboard> {
        let mut state = self.state.write().await;
        let mut updated = state.current(dashboard)?.clone();

        updated.status = dashboard.status.clone();
        updated.metadata.resource_version = state.next_version();
        state.objects.insert(updated.key(), updated.clone());
        debug!(
            dashboard = %updated.key(),
            version = updated.metadata.resource_version,
            "Status updated"
        );

        self.emit(Event::Modified(updated.clone()));
        Ok(updated)
    }

    async fn update_metadata(&self, dashboard: &Dashboard) -> Result<Dashboard> {
        let mut state = self.state.write().await;
        let stored = state.current(dashboard)?;

        if stored.is_deletion_requested() {
            let added = dashboard
                .metadata
                .finalizers
                .iter()
                .any(|f| !stored.metadata.finalizers.contains(f));
            if added {
                return Err(StoreError::Invalid(format!(
                    "{}: finalizers cannot be added once deletion is requested",
                    dashboard.key()
                )));
            }
        }

        let mut updated = stored.clone();
        updated.spec = dashboard.spec.clone();
        updated.metadata.finalizers = dashboard.metadata.finalizers.clone();
        updated.metadata.resource_version = state.next_version();
        let key = updated.key();

        if updated.is_deletion_requested() && updated.metadata.finalizers.is_empty() {
            state.objects.remove(&key);
            debug!(dashboard = %key, "Removed (finalizers cleared)");
            self.emit(Event::Deleted(key));
            return Ok(updated);
        }

        state.objects.insert(key.clone(), updated.clone());
        debug!(dashboard = %key, version = updated.metadata.resource_version, "Metadata updated");

        self.emit(Event::Modified(updated.clone()));
        Ok(updated)
    }
}

impl DataStore for MemoryStore {
    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}
