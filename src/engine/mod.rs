// Copyright (c) 2025-2026 Agrisync contributors. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync orchestrator.
//!
//! The [`SyncQueue`] ties the subsystem together: it owns the durable store,
//! the per-type remote handlers, and the connectivity source, and drives the
//! record state machine:
//!
//! ```text
//! pending ── sync run picks it ──▶ syncing ── success ──▶ (removed)
//!    ▲                               │
//!    └── retry_failed (under cap) ── failed (retry_count += 1)
//! ```
//!
//! A record at its retry cap stays `failed` until discarded or cleared. The
//! queue is an explicitly constructed value: build it with your store,
//! handlers, and connectivity source, share it behind an `Arc`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agrisync::{
//!     SyncQueue, QueueConfig, HandlerRegistry, ManualConnectivity,
//!     RecordType, EnqueueOptions,
//! };
//! use serde_json::json;
//!
//! # async fn example(handlers: HandlerRegistry) -> Result<(), agrisync::QueueError> {
//! let connectivity = Arc::new(ManualConnectivity::new(false));
//! let queue = SyncQueue::open(QueueConfig::default(), handlers, connectivity.clone()).await?;
//!
//! // Accepts writes while offline
//! queue.enqueue(
//!     RecordType::Harvest,
//!     json!({"crop": "maize", "kg": 120}),
//!     EnqueueOptions::default(),
//! ).await?;
//!
//! // Back online: deliver everything pending
//! connectivity.set_online(true);
//! let report = queue.sync().await?;
//! println!("delivered {} of {}", report.succeeded, report.attempted);
//! # Ok(())
//! # }
//! ```

mod types;
mod run;

pub use types::{QueueError, RetryReport, SkipReason, SyncReport};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use dashmap::DashSet;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::capability::{self, CapabilityMap, Feature};
use crate::config::QueueConfig;
use crate::connectivity::ConnectivitySource;
use crate::handler::HandlerRegistry;
use crate::record::{OfflineRecord, Priority, RecordStatus, RecordType};
use crate::stats::{self, SyncStats};
use crate::store::traits::{DurableStore, RecordFilter};
use crate::store::{InMemoryStore, SqliteStore};

/// Per-record options for [`SyncQueue::enqueue`].
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// UI ordering hint
    pub priority: Priority,
    /// Retry cap override; `None` uses the configured default
    pub max_retries: Option<u32>,
    /// Opaque extension metadata
    pub metadata: BTreeMap<String, String>,
}

impl EnqueueOptions {
    #[must_use]
    pub fn high_priority() -> Self {
        Self { priority: Priority::High, ..Default::default() }
    }
}

/// The offline-first mutation queue.
///
/// # Thread Safety
///
/// `Send + Sync`, designed for sharing behind an `Arc`. The re-entrancy
/// guard makes concurrent `sync()` calls collapse into one run, and the
/// in-flight set guarantees no record is held by two dispatches at once.
pub struct SyncQueue {
    /// Configuration (interior mutability for runtime toggles)
    pub(super) config: RwLock<QueueConfig>,

    /// Single source of truth for queued records
    pub(super) store: Arc<dyn DurableStore>,

    /// Per-type remote handlers
    pub(super) handlers: HandlerRegistry,

    /// Online/offline signal
    pub(super) connectivity: Arc<dyn ConnectivitySource>,

    /// Capability snapshot taken at construction
    pub(super) capabilities: CapabilityMap,

    /// Re-entrancy guard: only one sync run at a time
    pub(super) run_active: AtomicBool,

    /// Ids currently held by a dispatch (single writer per record)
    pub(super) in_flight: DashSet<String>,

    /// Successful deliveries this session
    pub(super) completed_session: AtomicU64,
}

impl SyncQueue {
    /// Build a queue over an explicit store.
    ///
    /// Capabilities are probed once here; construction itself cannot fail.
    pub fn new(
        config: QueueConfig,
        store: Arc<dyn DurableStore>,
        handlers: HandlerRegistry,
        connectivity: Arc<dyn ConnectivitySource>,
    ) -> Self {
        let capabilities = capability::detect(&config);
        Self {
            config: RwLock::new(config),
            store,
            handlers,
            connectivity,
            capabilities,
            run_active: AtomicBool::new(false),
            in_flight: DashSet::new(),
            completed_session: AtomicU64::new(0),
        }
    }

    /// Build a queue with the store implied by the config: SQLite when
    /// `db_path` is set, in-memory otherwise.
    pub async fn open(
        config: QueueConfig,
        handlers: HandlerRegistry,
        connectivity: Arc<dyn ConnectivitySource>,
    ) -> Result<Self, QueueError> {
        let store: Arc<dyn DurableStore> = match config.db_path.as_deref() {
            Some(path) => Arc::new(SqliteStore::open(path).await?),
            None => Arc::new(InMemoryStore::new()),
        };
        Ok(Self::new(config, store, handlers, connectivity))
    }

    /// Queue a mutation for later delivery.
    ///
    /// Succeeds while offline - that is the point. Rejects up front with
    /// [`QueueError::CapabilityUnavailable`] when the runtime cannot store
    /// the record durably, rather than queuing a write that can never sync.
    #[tracing::instrument(skip(self, payload, options), fields(record_type = %record_type))]
    pub async fn enqueue(
        &self,
        record_type: RecordType,
        payload: Value,
        options: EnqueueOptions,
    ) -> Result<OfflineRecord, QueueError> {
        let feature = Feature::for_record_type(record_type);
        if !self.capabilities.supports(feature) {
            return Err(QueueError::CapabilityUnavailable(feature));
        }

        let max_retries = options
            .max_retries
            .unwrap_or_else(|| self.config.read().default_max_retries);

        let record = OfflineRecord::new(record_type, payload)
            .with_priority(options.priority)
            .with_max_retries(max_retries)
            .with_metadata(options.metadata);

        self.store.insert(&record).await?;
        crate::metrics::record_enqueue(record_type);
        info!(id = %record.id, "Mutation queued for sync");
        Ok(record)
    }

    /// List pending records, optionally narrowed to one type, FIFO by
    /// creation time.
    pub async fn list_pending(
        &self,
        record_type: Option<RecordType>,
    ) -> Result<Vec<OfflineRecord>, QueueError> {
        let filter = RecordFilter {
            record_type,
            status: Some(RecordStatus::Pending),
        };
        Ok(self.store.list(&filter).await?)
    }

    /// List records matching an arbitrary filter.
    pub async fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<OfflineRecord>, QueueError> {
        Ok(self.store.list(filter).await?)
    }

    /// Compute queue statistics from the current store snapshot.
    pub async fn get_stats(&self) -> Result<SyncStats, QueueError> {
        let snapshot = self.store.list(&RecordFilter::all()).await?;
        let stats = stats::compute(
            &snapshot,
            self.completed_session.load(Ordering::Acquire),
        );
        crate::metrics::set_queue_depth(&stats);
        Ok(stats)
    }

    /// Manually remove a record (e.g. one stuck at its retry cap).
    /// Returns whether it existed.
    pub async fn discard(&self, id: &str) -> Result<bool, QueueError> {
        let removed = self.store.remove(id).await?;
        if removed {
            info!(id, "Record discarded");
        }
        Ok(removed)
    }

    /// Empty the queue. Recovery and testing hatch.
    pub async fn clear_all(&self) -> Result<u64, QueueError> {
        let cleared = self.store.clear_all().await?;
        info!(cleared, "Offline queue cleared");
        Ok(cleared)
    }

    /// Capability snapshot for this runtime.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityMap {
        &self.capabilities
    }

    /// Current connectivity state.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Whether a sync run is currently in flight.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.run_active.load(Ordering::Acquire)
    }

    /// Toggle automatic sync on reconnect.
    pub fn set_auto_sync(&self, enabled: bool) {
        self.config.write().auto_sync = enabled;
    }

    fn auto_sync_enabled(&self) -> bool {
        self.config.read().auto_sync
    }

    /// Spawn the auto-sync watcher: every offline -> online transition with
    /// `auto_sync` enabled triggers a run. The task runs until the returned
    /// handle is aborted.
    pub fn spawn_auto_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        let mut rx = self.connectivity.subscribe();
        // Snapshot before spawning: a transition that lands before the task's
        // first poll must register as a change, not as initial state.
        let mut was_online = *rx.borrow_and_update();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if online && !was_online && queue.auto_sync_enabled() {
                    info!("Connectivity restored, starting automatic sync");
                    if let Err(e) = queue.sync().await {
                        error!(error = %e, "Automatic sync failed");
                    }
                }
                was_online = online;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ManualConnectivity;
    use crate::handler::{DeliveryError, RemoteHandler};
    use async_trait::async_trait;
    use serde_json::json;

    struct AlwaysOk;

    #[async_trait]
    impl RemoteHandler for AlwaysOk {
        async fn deliver(&self, _payload: &Value) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    fn test_queue(online: bool) -> SyncQueue {
        let handlers =
            HandlerRegistry::new().register(RecordType::Harvest, Arc::new(AlwaysOk));
        SyncQueue::new(
            QueueConfig::default(),
            Arc::new(InMemoryStore::new()),
            handlers,
            Arc::new(ManualConnectivity::new(online)),
        )
    }

    #[tokio::test]
    async fn test_enqueue_assigns_id_and_defaults() {
        let queue = test_queue(false);

        let record = queue
            .enqueue(RecordType::Harvest, json!({"kg": 9}), EnqueueOptions::default())
            .await
            .unwrap();

        assert!(!record.id.is_empty());
        assert_eq!(record.status, RecordStatus::Pending);
        assert_eq!(record.max_retries, 3);
    }

    #[tokio::test]
    async fn test_enqueue_while_offline_is_visible() {
        let queue = test_queue(false);

        queue
            .enqueue(RecordType::Harvest, json!({"kg": 1}), EnqueueOptions::default())
            .await
            .unwrap();

        let pending = queue.list_pending(None).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_respects_overrides() {
        let queue = test_queue(false);

        let record = queue
            .enqueue(
                RecordType::Harvest,
                json!({}),
                EnqueueOptions {
                    priority: Priority::High,
                    max_retries: Some(7),
                    metadata: BTreeMap::new(),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.priority, Priority::High);
        assert_eq!(record.max_retries, 7);
    }

    #[tokio::test]
    async fn test_list_pending_filters_by_type() {
        let queue = test_queue(false);
        queue
            .enqueue(RecordType::Harvest, json!({}), EnqueueOptions::default())
            .await
            .unwrap();

        let harvests = queue.list_pending(Some(RecordType::Harvest)).await.unwrap();
        assert_eq!(harvests.len(), 1);

        let orders = queue.list_pending(Some(RecordType::Order)).await.unwrap();
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn test_discard() {
        let queue = test_queue(false);
        let record = queue
            .enqueue(RecordType::Harvest, json!({}), EnqueueOptions::default())
            .await
            .unwrap();

        assert!(queue.discard(&record.id).await.unwrap());
        assert!(!queue.discard(&record.id).await.unwrap());
        assert!(queue.list_pending(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_is_total() {
        let queue = test_queue(false);
        for i in 0..3 {
            queue
                .enqueue(RecordType::Harvest, json!({"i": i}), EnqueueOptions::default())
                .await
                .unwrap();
        }

        assert_eq!(queue.clear_all().await.unwrap(), 3);
        assert!(queue.list_pending(None).await.unwrap().is_empty());
        assert_eq!(queue.get_stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_auto_sync_catches_transition_before_first_poll() {
        // On a current-thread runtime the watcher task cannot run until this
        // test yields, so the reconnect below lands before its first poll.
        // It must still be seen as a transition and trigger a run.
        let handlers =
            HandlerRegistry::new().register(RecordType::Harvest, Arc::new(AlwaysOk));
        let connectivity = Arc::new(ManualConnectivity::new(false));
        let queue = Arc::new(SyncQueue::new(
            QueueConfig::default(),
            Arc::new(InMemoryStore::new()),
            handlers,
            connectivity.clone(),
        ));

        queue
            .enqueue(RecordType::Harvest, json!({}), EnqueueOptions::default())
            .await
            .unwrap();

        let _watcher = queue.spawn_auto_sync();
        connectivity.set_online(true);

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while queue.get_stats().await.unwrap().total > 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "reconnect before the watcher's first poll was swallowed"
            );
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_enqueue_rejected_without_storage_capability() {
        let config = QueueConfig {
            db_path: Some("/nonexistent-dir-for-probe/sub/q.db".to_string()),
            ..Default::default()
        };
        let queue = SyncQueue::new(
            config,
            Arc::new(InMemoryStore::new()),
            HandlerRegistry::new(),
            Arc::new(ManualConnectivity::new(false)),
        );

        let result = queue
            .enqueue(RecordType::Harvest, json!({}), EnqueueOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(QueueError::CapabilityUnavailable(Feature::Harvests))
        ));
    }

    #[tokio::test]
    async fn test_capabilities_reported() {
        let queue = test_queue(true);
        let caps = queue.capabilities();
        assert!(caps.storage);
        assert!(caps.supports(Feature::Harvests));
    }

    #[tokio::test]
    async fn test_set_auto_sync() {
        let queue = test_queue(true);
        assert!(queue.auto_sync_enabled());
        queue.set_auto_sync(false);
        assert!(!queue.auto_sync_enabled());
    }
}
