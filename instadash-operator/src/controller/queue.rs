//! Work queue with per-key deduplication and single-flight processing.
//!
//! A key handed out by `next` is "processing" until `done` is called. Adding
//! a processing key marks it dirty; it is queued again once `done` runs, so
//! no two workers ever hold the same key.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

struct Inner<K> {
    queue: VecDeque<K>,
    queued: HashSet<K>,
    processing: HashSet<K>,
    dirty: HashSet<K>,
    shutdown: bool,
}

/// FIFO of keys awaiting reconciliation.
pub struct WorkQueue<K> {
    inner: Mutex<Inner<K>>,
    notify: Notify,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                queued: HashSet::new(),
                processing: HashSet::new(),
                dirty: HashSet::new(),
                shutdown: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Queue `key` unless it is already waiting.
    pub async fn add(&self, key: K) {
        let mut inner = self.inner.lock().await;
        if inner.shutdown {
            return;
        }
        if inner.processing.contains(&key) {
            inner.dirty.insert(key);
            return;
        }
        if inner.queued.insert(key.clone()) {
            inner.queue.push_back(key);
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Queue `key` once `delay` has elapsed.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key).await;
        });
    }

    /// Wait for the next key. Returns `None` after `shutdown`.
    pub async fn next(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock().await;
                if inner.shutdown {
                    return None;
                }
                if let Some(key) = inner.queue.pop_front() {
                    inner.queued.remove(&key);
                    inner.processing.insert(key.clone());
                    let more = !inner.queue.is_empty();
                    drop(inner);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as finished. A key added while it was processing is queued again.
    pub async fn done(&self, key: &K) {
        let mut inner = self.inner.lock().await;
        inner.processing.remove(key);
        if inner.dirty.remove(key) && !inner.shutdown && inner.queued.insert(key.clone()) {
            inner.queue.push_back(key.clone());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiting worker.
    pub async fn shutdown(&self) {
        self.inner.lock().await.shutdown = true;
        self.notify.notify_waiters();
    }

    /// Number of keys waiting (not counting keys being processed).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<K> Default for WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deduplicates_waiting_keys() {
        let queue = WorkQueue::new();
        queue.add("a").await;
        queue.add("b").await;
        queue.add("a").await;

        assert_eq!(queue.len().await, 2);
        assert_eq!(queue.next().await, Some("a"));
        assert_eq!(queue.next().await, Some("b"));
    }

    #[tokio::test]
    async fn test_processing_key_is_requeued_after_done() {
        let queue = WorkQueue::new();
        queue.add("a").await;
        let key = queue.next().await.unwrap();

        // Re-added while processing: not handed out again yet.
        queue.add("a").await;
        assert!(queue.is_empty().await);

        queue.done(&key).await;
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.next().await, Some("a"));
    }

    #[tokio::test]
    async fn test_done_without_readd_does_not_requeue() {
        let queue = WorkQueue::new();
        queue.add("a").await;
        let key = queue.next().await.unwrap();
        queue.done(&key).await;
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_next_waits_for_add() {
        let queue = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.add("late").await;
        assert_eq!(waiter.await.unwrap(), Some("late"));
    }

    #[tokio::test]
    async fn test_add_after_delays() {
        let queue = Arc::new(WorkQueue::new());
        queue.add_after("a", Duration::from_millis(50));
        assert!(queue.is_empty().await);

        let key = tokio::time::timeout(Duration::from_secs(2), queue.next())
            .await
            .unwrap();
        assert_eq!(key, Some("a"));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let queue: Arc<WorkQueue<&str>> = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.shutdown().await;
        assert_eq!(waiter.await.unwrap(), None);

        queue.add("ignored").await;
        assert!(queue.is_empty().await);
    }
}
