//! Outbox dispatcher: the poll loop that drains pending outbox rows onto
//! the substrate.
//!
//! A batch-publish worker loop: read a batch, publish each entry, keep
//! going past individual failures, sleep, repeat. A message published but
//! not yet marked published before a crash is published again on the next
//! pass; the substrate's dedup window (keyed on the outbox id) makes the
//! duplicate publish harmless.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_ports::{OutboxStore, SubstratePublisher};
use tracing::{debug, error, warn};

/// Dispatcher tuning. `max_retries == 0` means retry forever.
#[derive(Debug, Clone, Copy)]
pub struct OutboxDispatcherConfig {
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
}

impl Default for OutboxDispatcherConfig {
    fn default() -> Self {
        OutboxDispatcherConfig {
            batch_size: 100,
            poll_interval_ms: 500,
            max_retries: 0,
        }
    }
}

/// Drains an [`OutboxStore`] onto a [`SubstratePublisher`].
pub struct OutboxDispatcher<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
    config: OutboxDispatcherConfig,
}

impl<S, P> OutboxDispatcher<S, P>
where
    S: OutboxStore,
    P: SubstratePublisher,
{
    pub fn new(store: Arc<S>, publisher: Arc<P>, config: OutboxDispatcherConfig) -> Self {
        OutboxDispatcher {
            store,
            publisher,
            config,
        }
    }

    /// Run until `running` is cleared. Never returns `Err`: per-batch
    /// failures are logged and the loop keeps polling, treating a failed
    /// pass as transient.
    pub async fn run(&self, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            match self.process_once().await {
                Ok(count) if count > 0 => debug!(dispatched = count, "outbox batch dispatched"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "outbox dispatch pass failed"),
            }
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }
    }

    /// Dispatch a single batch, returning the number of events published.
    pub async fn process_once(&self) -> Result<usize, DispatchError> {
        let pending = self
            .store
            .fetch_pending(self.config.batch_size)
            .await
            .map_err(|e| DispatchError::Store(e.to_string()))?;

        let mut dispatched = 0;
        for event in pending {
            let message_id = event.message_id();
            match self
                .publisher
                .publish_with_id(&event.subject, &event.payload, &message_id)
                .await
            {
                Ok(()) => {
                    if let Err(e) = self.store.mark_published(event.id).await {
                        error!(error = %e, outbox_id = %event.id, "published but failed to mark published");
                    } else {
                        dispatched += 1;
                    }
                }
                Err(e) => {
                    warn!(outbox_id = %event.id, error = %e, "publish failed, will retry");
                    let attempted = event.retry_count + 1;
                    let exhausted =
                        self.config.max_retries > 0 && attempted > self.config.max_retries;
                    if exhausted {
                        if let Err(e) = self.store.mark_failed(event.id).await {
                            error!(error = %e, outbox_id = %event.id, "failed to mark outbox event failed");
                        }
                    } else if let Err(e) = self.store.mark_retry(event.id).await {
                        error!(error = %e, outbox_id = %event.id, "failed to record outbox retry");
                    }
                }
            }
        }
        Ok(dispatched)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("outbox store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_domain::{OutboxEvent, OutboxStatus};
    use relay_ports::{OutboxStoreError, SubstrateError};
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    /// An in-memory fake store recording status transitions, so the
    /// dispatcher's retry/fail decision can be exercised without Postgres.
    #[derive(Default)]
    struct FakeStore {
        events: StdMutex<Vec<OutboxEvent>>,
    }

    impl FakeStore {
        fn seeded(events: Vec<OutboxEvent>) -> Self {
            FakeStore {
                events: StdMutex::new(events),
            }
        }

        fn status_of(&self, id: Uuid) -> OutboxStatus {
            self.events
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.id == id)
                .unwrap()
                .status
        }

        fn retry_count_of(&self, id: Uuid) -> u32 {
            self.events
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.id == id)
                .unwrap()
                .retry_count
        }
    }

    impl OutboxStore for FakeStore {
        async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>, OutboxStoreError> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.status == OutboxStatus::Pending)
                .take(limit)
                .cloned()
                .collect())
        }

        async fn mark_published(&self, id: Uuid) -> Result<(), OutboxStoreError> {
            let mut events = self.events.lock().unwrap();
            if let Some(event) = events.iter_mut().find(|e| e.id == id) {
                event.status = OutboxStatus::Published;
                event.published_at = Some(chrono::Utc::now());
            }
            Ok(())
        }

        async fn mark_retry(&self, id: Uuid) -> Result<(), OutboxStoreError> {
            let mut events = self.events.lock().unwrap();
            if let Some(event) = events.iter_mut().find(|e| e.id == id) {
                event.retry_count += 1;
            }
            Ok(())
        }

        async fn mark_failed(&self, id: Uuid) -> Result<(), OutboxStoreError> {
            let mut events = self.events.lock().unwrap();
            if let Some(event) = events.iter_mut().find(|e| e.id == id) {
                event.status = OutboxStatus::Failed;
            }
            Ok(())
        }
    }

    /// A fake publisher that either always succeeds or always fails.
    struct FakePublisher {
        fail: bool,
    }

    impl SubstratePublisher for FakePublisher {
        async fn publish_with_id(
            &self,
            _subject: &str,
            _payload: &[u8],
            _message_id: &str,
        ) -> Result<(), SubstrateError> {
            if self.fail {
                Err(SubstrateError::PublishError {
                    message: "simulated failure".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn event() -> OutboxEvent {
        OutboxEvent::pending(
            "up.leaf.snc.none.desk1.orders.order.created",
            Some(vec![1, 2, 3]),
        )
    }

    #[tokio::test]
    async fn successful_publish_marks_event_published() {
        let e = event();
        let id = e.id;
        let store = Arc::new(FakeStore::seeded(vec![e]));
        let publisher = Arc::new(FakePublisher { fail: false });
        let dispatcher = OutboxDispatcher::new(store.clone(), publisher, OutboxDispatcherConfig::default());

        let dispatched = dispatcher.process_once().await.unwrap();

        assert_eq!(dispatched, 1);
        assert_eq!(store.status_of(id), OutboxStatus::Published);
    }

    #[tokio::test]
    async fn failed_publish_under_retry_budget_stays_pending_and_increments_retry_count() {
        let e = event();
        let id = e.id;
        let store = Arc::new(FakeStore::seeded(vec![e]));
        let publisher = Arc::new(FakePublisher { fail: true });
        let dispatcher = OutboxDispatcher::new(
            store.clone(),
            publisher,
            OutboxDispatcherConfig {
                max_retries: 3,
                ..OutboxDispatcherConfig::default()
            },
        );

        dispatcher.process_once().await.unwrap();

        assert_eq!(store.status_of(id), OutboxStatus::Pending);
        assert_eq!(store.retry_count_of(id), 1);
    }

    #[tokio::test]
    async fn failed_publish_exhausting_retry_budget_marks_failed() {
        let mut e = event();
        e.retry_count = 3;
        let id = e.id;
        let store = Arc::new(FakeStore::seeded(vec![e]));
        let publisher = Arc::new(FakePublisher { fail: true });
        let dispatcher = OutboxDispatcher::new(
            store.clone(),
            publisher,
            OutboxDispatcherConfig {
                max_retries: 3,
                ..OutboxDispatcherConfig::default()
            },
        );

        dispatcher.process_once().await.unwrap();

        assert_eq!(store.status_of(id), OutboxStatus::Failed);
    }

    #[tokio::test]
    async fn zero_max_retries_means_retry_forever() {
        let mut e = event();
        e.retry_count = 1_000;
        let id = e.id;
        let store = Arc::new(FakeStore::seeded(vec![e]));
        let publisher = Arc::new(FakePublisher { fail: true });
        let dispatcher = OutboxDispatcher::new(
            store.clone(),
            publisher,
            OutboxDispatcherConfig {
                max_retries: 0,
                ..OutboxDispatcherConfig::default()
            },
        );

        dispatcher.process_once().await.unwrap();

        assert_eq!(store.status_of(id), OutboxStatus::Pending);
        assert_eq!(store.retry_count_of(id), 1_001);
    }
}
