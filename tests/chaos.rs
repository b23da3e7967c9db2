//! Chaos Tests for the Offline Queue
//!
//! Injects storage faults through a wrapper around [`InMemoryStore`] and
//! checks the engine's failure contract: record-level delivery failures are
//! absorbed, store faults propagate, and neither leaves the engine wedged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use async_trait::async_trait;
use serde_json::{json, Value};

use agrisync::{
    DeliveryError, DurableStore, EnqueueOptions, HandlerRegistry, InMemoryStore,
    ManualConnectivity, OfflineRecord, QueueConfig, QueueError, RecordFilter, RecordStatus,
    RecordType, RemoteHandler, StorageError, SyncQueue,
};

// =============================================================================
// Fault Injection
// =============================================================================

/// Wraps a real store and fails selected operations on demand.
struct FaultyStore {
    inner: InMemoryStore,
    fail_lists: AtomicBool,
    fail_updates: AtomicBool,
    /// Fail `update_status` only after this many successful calls.
    updates_before_fault: AtomicUsize,
}

impl FaultyStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryStore::new(),
            fail_lists: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            updates_before_fault: AtomicUsize::new(usize::MAX),
        })
    }

    fn fault() -> StorageError {
        StorageError::Backend("injected fault: disk I/O error".into())
    }
}

#[async_trait]
impl DurableStore for FaultyStore {
    async fn insert(&self, record: &OfflineRecord) -> Result<(), StorageError> {
        self.inner.insert(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<OfflineRecord>, StorageError> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<OfflineRecord>, StorageError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(Self::fault());
        }
        self.inner.list(filter).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: RecordStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::fault());
        }
        if self.updates_before_fault.fetch_sub(1, Ordering::SeqCst) == 0 {
            self.fail_updates.store(true, Ordering::SeqCst);
            return Err(Self::fault());
        }
        self.inner.update_status(id, status, error).await
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        self.inner.remove(id).await
    }

    async fn clear_all(&self) -> Result<u64, StorageError> {
        self.inner.clear_all().await
    }

    async fn count(&self) -> Result<u64, StorageError> {
        self.inner.count().await
    }
}

struct AlwaysOk {
    delivered: AtomicUsize,
}

impl AlwaysOk {
    fn new() -> Arc<Self> {
        Arc::new(Self { delivered: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl RemoteHandler for AlwaysOk {
    async fn deliver(&self, _payload: &Value) -> Result<(), DeliveryError> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Route engine logs through the test harness; `RUST_LOG` controls verbosity.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn queue_over(store: Arc<dyn DurableStore>, handlers: HandlerRegistry) -> SyncQueue {
    init_tracing();
    SyncQueue::new(
        QueueConfig::default(),
        store,
        handlers,
        Arc::new(ManualConnectivity::new(true)),
    )
}

// =============================================================================
// Chaos Scenarios
// =============================================================================

#[tokio::test]
async fn chaos_list_fault_surfaces_and_guard_releases() {
    let store = FaultyStore::new();
    let handler = AlwaysOk::new();
    let handlers = HandlerRegistry::new()
        .register(RecordType::Harvest, handler.clone() as Arc<dyn RemoteHandler>);
    let queue = queue_over(store.clone(), handlers);

    queue
        .enqueue(RecordType::Harvest, json!({}), EnqueueOptions::default())
        .await
        .unwrap();

    store.fail_lists.store(true, Ordering::SeqCst);
    let err = queue.sync().await.unwrap_err();
    assert!(matches!(err, QueueError::Storage(StorageError::Backend(_))));
    assert!(!queue.is_syncing(), "run guard must release after a store fault");

    // Fault clears, engine is usable again
    store.fail_lists.store(false, Ordering::SeqCst);
    let report = queue.sync().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(handler.delivered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chaos_update_fault_mid_run_keeps_earlier_successes() {
    let store = FaultyStore::new();
    let handler = AlwaysOk::new();
    let handlers = HandlerRegistry::new()
        .register(RecordType::Harvest, handler.clone() as Arc<dyn RemoteHandler>);
    let queue = queue_over(store.clone(), handlers);

    for i in 0..4 {
        queue
            .enqueue(RecordType::Harvest, json!({"i": i}), EnqueueOptions::default())
            .await
            .unwrap();
    }

    // Two syncing-transitions succeed, the third faults
    store.updates_before_fault.store(2, Ordering::SeqCst);
    let err = queue.sync().await.unwrap_err();
    assert!(matches!(err, QueueError::Storage(_)));
    assert!(!queue.is_syncing());

    // The two records dispatched before the fault were delivered and removed
    assert_eq!(handler.delivered.load(Ordering::SeqCst), 2);
    assert_eq!(store.inner.count().await.unwrap(), 2);

    // Recovery drains the remainder
    store.fail_updates.store(false, Ordering::SeqCst);
    store.updates_before_fault.store(usize::MAX, Ordering::SeqCst);
    let report = queue.sync().await.unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(store.inner.count().await.unwrap(), 0);
}

#[tokio::test]
async fn chaos_retry_failed_propagates_list_fault() {
    let store = FaultyStore::new();
    let queue = queue_over(store.clone(), HandlerRegistry::new());

    store.fail_lists.store(true, Ordering::SeqCst);
    let err = queue.retry_failed().await.unwrap_err();
    assert!(matches!(err, QueueError::Storage(_)));

    store.fail_lists.store(false, Ordering::SeqCst);
    let report = queue.retry_failed().await.unwrap();
    assert_eq!(report.requeued, 0);
}

#[tokio::test]
async fn chaos_stats_fault_does_not_corrupt_queue() {
    let store = FaultyStore::new();
    let handler = AlwaysOk::new();
    let handlers = HandlerRegistry::new()
        .register(RecordType::Order, handler as Arc<dyn RemoteHandler>);
    let queue = queue_over(store.clone(), handlers);

    queue
        .enqueue(RecordType::Order, json!({}), EnqueueOptions::default())
        .await
        .unwrap();

    store.fail_lists.store(true, Ordering::SeqCst);
    assert!(queue.get_stats().await.is_err());

    store.fail_lists.store(false, Ordering::SeqCst);
    let stats = queue.get_stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending, 1);
}
