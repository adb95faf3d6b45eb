//! Controller - turns store events into reconciles.
//!
//! Store events, the initial listing and periodic resyncs feed a `WorkQueue`.
//! A fixed pool of workers drains the queue; failed reconciles are requeued
//! with exponential backoff.

mod queue;

pub use queue::WorkQueue;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::audit::AuditLogger;
use crate::reconciler::{Outcome, ReconcileError, Reconciler};
use crate::resource::ObjectKey;
use crate::store::{DataStore, StoreError};

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent workers (distinct keys only).
    pub workers: usize,
    /// Deadline for a whole reconcile.
    pub reconcile_timeout: Duration,
    /// Delay before the first retry.
    pub backoff_base: Duration,
    /// Upper bound for retry delays.
    pub backoff_max: Duration,
    /// Requeue every Dashboard at this interval. `None` disables resync.
    pub resync_interval: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            reconcile_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
            resync_interval: Some(Duration::from_secs(300)),
        }
    }
}

/// Delay before retry number `failures` (zero-based): `base * 2^failures`, capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(failures)).min(max)
}

/// Dashboard controller.
pub struct Controller {
    store: Arc<dyn DataStore>,
    reconciler: Arc<dyn Reconciler>,
    config: ControllerConfig,
    audit: AuditLogger,
    queue: Arc<WorkQueue<ObjectKey>>,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl Controller {
    pub fn new(
        store: Arc<dyn DataStore>,
        reconciler: Arc<dyn Reconciler>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            reconciler,
            config,
            audit: AuditLogger::default(),
            queue: Arc::new(WorkQueue::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    ///
    /// Fails only if the initial listing fails.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<(), StoreError> {
        // Subscribe before listing so no change slips between the two.
        let mut events = self.store.subscribe();
        let count = self.enqueue_all().await?;
        info!(
            dashboards = count,
            workers = self.config.workers,
            "Controller started"
        );

        let workers: Vec<JoinHandle<()>> = (0..self.config.workers.max(1))
            .map(|id| {
                let this = Arc::clone(&self);
                tokio::spawn(async move { this.worker(id).await })
            })
            .collect();

        let mut resync = self.config.resync_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => self.queue.add(event.key()).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event stream lagged, relisting");
                        self.relist().await;
                    }
                    Err(RecvError::Closed) => {
                        info!("Event stream closed");
                        break;
                    }
                },
                _ = tick(&mut resync) => {
                    debug!("Periodic resync");
                    self.relist().await;
                }
            }
        }

        info!("Controller stopping");
        self.queue.shutdown().await;
        for handle in workers {
            let _ = handle.await;
        }
        info!("Controller stopped");
        Ok(())
    }

    async fn enqueue_all(&self) -> Result<usize, StoreError> {
        let dashboards = self.store.list().await?;
        let count = dashboards.len();
        for dashboard in dashboards {
            self.queue.add(dashboard.key()).await;
        }
        Ok(count)
    }

    async fn relist(&self) {
        if let Err(e) = self.enqueue_all().await {
            error!("Failed to list dashboards: {}", e);
        }
    }

    async fn worker(&self, id: usize) {
        debug!(worker = id, "Worker started");
        while let Some(key) = self.queue.next().await {
            let deadline = Instant::now() + self.config.reconcile_timeout;
            let result = self.reconciler.reconcile(&key, deadline).await;
            self.handle_result(&key, result).await;
            self.queue.done(&key).await;
        }
        debug!(worker = id, "Worker stopped");
    }

    async fn handle_result(&self, key: &ObjectKey, result: Result<Outcome, ReconcileError>) {
        match result {
            Ok(outcome) => {
                self.failures.lock().await.remove(key);
                match outcome {
                    Outcome::Absent | Outcome::Unchanged => {
                        debug!(dashboard = %key, ?outcome, "Reconciled")
                    }
                    _ => info!(dashboard = %key, ?outcome, "Reconciled"),
                }
            }
            Err(e) => {
                let failures = {
                    let mut failures = self.failures.lock().await;
                    let count = failures.entry(key.clone()).or_insert(0);
                    let previous = *count;
                    *count = count.saturating_add(1);
                    previous
                };
                let delay =
                    backoff_delay(self.config.backoff_base, self.config.backoff_max, failures);
                error!(
                    dashboard = %key,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Reconcile failed"
                );
                self.audit
                    .reconcile_failed(key, &e.to_string(), delay.as_millis() as u64);
                self.queue.add_after(key.clone(), delay);
            }
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
