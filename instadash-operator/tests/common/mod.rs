//! Shared test utilities for instadash-operator integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response as ReqwestResponse};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;

use instadash_operator::clients::{ClientError, DashboardApi, DeleteOutcome, RemoteDashboard};
use instadash_operator::config::{ApiCredentials, StaticCredentials};
use instadash_operator::resource::{Dashboard, ObjectKey};
use instadash_operator::store::{
    CreateDashboardRequest, DashboardStore, DataStore, Event, MemoryStore, Result as StoreResult,
    StoreError,
};
use instadash_operator::DashboardReconciler;
use instadash_operator::rest::{AppState, create_router};

pub const NAMESPACE: &str = "default";

pub fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

pub fn credentials() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new(ApiCredentials::new(
        "https://tenant.instana.io",
        "token",
    )))
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// =============================================================================
// Fake remote dashboard service
// =============================================================================

/// In-memory stand-in for the Instana API that records every call.
#[derive(Default)]
pub struct FakeApi {
    next_id: AtomicU32,
    /// Remote dashboards: id -> title.
    pub remote: Mutex<BTreeMap<String, String>>,
    /// Config payload of every create call, including failed ones.
    pub creates: Mutex<Vec<String>>,
    /// Id of every delete call, including failed ones.
    pub deletes: Mutex<Vec<String>>,
    /// Number of upcoming create calls that fail with a transport error.
    pub fail_creates: AtomicU32,
    /// Number of upcoming delete calls that fail with a transport error.
    pub fail_deletes: AtomicU32,
    /// Answer creates with a body the client cannot interpret.
    pub malformed_creates: AtomicBool,
    /// Delay applied to every create call.
    pub create_delay: Mutex<Option<Duration>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create_calls(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn remote_ids(&self) -> Vec<String> {
        self.remote.lock().unwrap().keys().cloned().collect()
    }

    fn unavailable(&self) -> ClientError {
        ClientError::Transport {
            url: "https://tenant.instana.io/api/custom-dashboard".to_string(),
            reason: "connection refused".to_string(),
        }
    }
}

#[async_trait]
impl DashboardApi for FakeApi {
    async fn create_dashboard(
        &self,
        _credentials: &ApiCredentials,
        config: &str,
    ) -> Result<RemoteDashboard, ClientError> {
        self.creates.lock().unwrap().push(config.to_string());

        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if take_one(&self.fail_creates) {
            return Err(self.unavailable());
        }
        if self.malformed_creates.load(Ordering::SeqCst) {
            return Err(ClientError::Malformed {
                url: "https://tenant.instana.io/api/custom-dashboard".to_string(),
                reason: "expected value at line 1 column 1".to_string(),
            });
        }

        let title = serde_json::from_str::<serde_json::Value>(config)
            .ok()
            .and_then(|v| v.get("title").and_then(|t| t.as_str()).map(str::to_string))
            .unwrap_or_default();
        let id = format!("d{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.remote
            .lock()
            .unwrap()
            .insert(id.clone(), title.clone());
        Ok(RemoteDashboard { id, title })
    }

    async fn delete_dashboard(
        &self,
        _credentials: &ApiCredentials,
        id: &str,
    ) -> Result<DeleteOutcome, ClientError> {
        self.deletes.lock().unwrap().push(id.to_string());
        if take_one(&self.fail_deletes) {
            return Err(self.unavailable());
        }
        match self.remote.lock().unwrap().remove(id) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }
}

// =============================================================================
// Store with injectable failures
// =============================================================================

/// `MemoryStore` wrapper that can simulate crashes, concurrent writers and
/// concurrent deletions.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    /// Upcoming metadata writes that fail as if the process died mid-reconcile.
    pub fail_metadata_updates: AtomicU32,
    /// Upcoming status writes that race with another writer and go stale.
    pub conflict_status_updates: AtomicU32,
    /// Upcoming metadata writes that race with another writer and go stale.
    pub conflict_metadata_updates: AtomicU32,
    /// Remove the resource right before the next status write.
    pub remove_before_status: AtomicBool,
    /// Record this remote id, as another writer would, right before the next status write.
    pub supersede_status: Mutex<Option<String>>,
    /// Remove the resource right before the next metadata write.
    pub remove_before_metadata: AtomicBool,
    pub status_updates: AtomicU32,
    pub metadata_updates: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bump the stored resource version, as a concurrent writer would.
    async fn touch(&self, key: &ObjectKey) {
        if let Ok(Some(current)) = self.inner.get(key).await {
            let _ = self.inner.update_metadata(&current).await;
        }
    }
}

#[async_trait]
impl DashboardStore for FlakyStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<Dashboard>> {
        self.inner.get(key).await
    }

    async fn list(&self) -> StoreResult<Vec<Dashboard>> {
        self.inner.list().await
    }

    async fn create(&self, req: CreateDashboardRequest) -> StoreResult<Dashboard> {
        self.inner.create(req).await
    }

    async fn request_deletion(&self, key: &ObjectKey) -> StoreResult<Option<Dashboard>> {
        self.inner.request_deletion(key).await
    }

    async fn update_status(&self, dashboard: &Dashboard) -> StoreResult<Dashboard> {
        self.status_updates.fetch_add(1, Ordering::SeqCst);
        if self.remove_before_status.swap(false, Ordering::SeqCst) {
            let _ = self.inner.request_deletion(&dashboard.key()).await;
        }
        let supersede = self.supersede_status.lock().unwrap().take();
        if let Some(id) = supersede {
            if let Ok(Some(mut current)) = self.inner.get(&dashboard.key()).await {
                current.status.dashboard_id = id;
                let _ = self.inner.update_status(&current).await;
            }
        }
        if take_one(&self.conflict_status_updates) {
            self.touch(&dashboard.key()).await;
        }
        self.inner.update_status(dashboard).await
    }

    async fn update_metadata(&self, dashboard: &Dashboard) -> StoreResult<Dashboard> {
        self.metadata_updates.fetch_add(1, Ordering::SeqCst);
        if self.remove_before_metadata.swap(false, Ordering::SeqCst) {
            let _ = self.inner.request_deletion(&dashboard.key()).await;
        }
        if take_one(&self.fail_metadata_updates) {
            return Err(StoreError::Internal("simulated crash".to_string()));
        }
        if take_one(&self.conflict_metadata_updates) {
            self.touch(&dashboard.key()).await;
        }
        self.inner.update_metadata(dashboard).await
    }
}

impl DataStore for FlakyStore {
    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.subscribe()
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub struct Fixture {
    pub store: Arc<FlakyStore>,
    pub api: Arc<FakeApi>,
    pub reconciler: DashboardReconciler,
}

impl Fixture {
    pub fn new() -> Self {
        let store = FlakyStore::new();
        let api = FakeApi::new();
        let reconciler = DashboardReconciler::new(store.clone(), api.clone(), credentials())
            .with_call_timeout(Duration::from_secs(2));
        Self {
            store,
            api,
            reconciler,
        }
    }

    /// Submit a Pending Dashboard.
    pub async fn submit(&self, name: &str, config: &str) -> ObjectKey {
        let created = self
            .store
            .create(CreateDashboardRequest {
                namespace: NAMESPACE.to_string(),
                name: name.to_string(),
                config: config.to_string(),
            })
            .await
            .unwrap();
        created.key()
    }

    pub async fn get(&self, key: &ObjectKey) -> Option<Dashboard> {
        self.store.get(key).await.unwrap()
    }
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let until = Instant::now() + timeout;
    while Instant::now() < until {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// =============================================================================
// REST server
// =============================================================================

pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub store: Arc<MemoryStore>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    /// Spawn the REST API on an OS-assigned port with an empty in-memory store.
    pub async fn spawn() -> Self {
        let store = Arc::new(MemoryStore::new());
        let router = create_router(Arc::new(AppState {
            store: store.clone(),
        }));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            client: Client::new(),
            store,
            shutdown_tx,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub async fn get(&self, path: &str) -> ReqwestResponse {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> ReqwestResponse {
        self.client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn delete(&self, path: &str) -> ReqwestResponse {
        self.client
            .delete(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}
