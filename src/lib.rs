//! # Agrisync Offline Queue
//!
//! An offline-first mutation queue and synchronization engine for the
//! agrisync marketplace client. The app keeps accepting writes (harvests,
//! orders, listings, payments, shipment updates) while the device has no
//! network, and reconciles them with the backend once connectivity returns.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       UI / app layer                        │
//! │  • enqueue(type, payload) while offline                     │
//! │  • dashboards read get_stats() and capabilities()           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   SyncQueue (orchestrator)                  │
//! │  • re-entrancy guard: one run at a time                     │
//! │  • groups pending records by type                           │
//! │  • FIFO within a type, types run concurrently               │
//! │  • retry accounting with a per-record cap                   │
//! └─────────────────────────────────────────────────────────────┘
//!        │                     │                      │
//!        ▼                     ▼                      ▼
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ DurableStore │   │  RemoteHandlers  │   │ Connectivity     │
//! │ SQLite / mem │   │  one per type    │   │ manual / polling │
//! └──────────────┘   └──────────────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agrisync::{
//!     SyncQueue, QueueConfig, HandlerRegistry, ManualConnectivity,
//!     RemoteHandler, DeliveryError, RecordType, EnqueueOptions,
//! };
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//!
//! struct HarvestApi;
//!
//! #[async_trait]
//! impl RemoteHandler for HarvestApi {
//!     async fn deliver(&self, payload: &Value) -> Result<(), DeliveryError> {
//!         // POST to the harvests endpoint; any non-2xx is an Err
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), agrisync::QueueError> {
//!     let handlers = HandlerRegistry::new()
//!         .register(RecordType::Harvest, Arc::new(HarvestApi));
//!     let connectivity = Arc::new(ManualConnectivity::new(false));
//!
//!     let config = QueueConfig {
//!         db_path: Some("./agrisync-queue.db".into()),
//!         ..Default::default()
//!     };
//!     let queue = Arc::new(SyncQueue::open(config, handlers, connectivity.clone()).await?);
//!     let _watcher = queue.spawn_auto_sync();
//!
//!     // Offline: the write is queued durably
//!     queue.enqueue(
//!         RecordType::Harvest,
//!         json!({"crop": "maize", "kg": 120}),
//!         EnqueueOptions::default(),
//!     ).await?;
//!
//!     // Back online: the watcher syncs automatically
//!     connectivity.set_online(true);
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - **Durability**: records enqueued offline survive restarts and are
//!   immediately visible to `list_pending`
//! - **FIFO within a type**: a type's records are delivered in creation
//!   order; different types sync concurrently with no cross-type ordering
//! - **Retry cap**: `retry_count` never exceeds `max_retries`; exhausted
//!   records wait for manual intervention
//! - **No double-processing**: one run at a time, one writer per record
//! - **Isolated failures**: a failed record never aborts the batch; only a
//!   store fault surfaces as an error
//!
//! ## Modules
//!
//! - [`engine`]: the [`SyncQueue`] orchestrator
//! - [`store`]: durable record storage (SQLite, in-memory)
//! - [`record`]: the queued-mutation data model
//! - [`handler`]: the remote delivery boundary
//! - [`connectivity`]: online/offline tracking
//! - [`capability`]: runtime support detection
//! - [`backoff`]: optional retry pacing
//! - [`stats`]: derived queue statistics

pub mod backoff;
pub mod capability;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod handler;
pub mod metrics;
pub mod record;
pub mod stats;
pub mod store;

pub use backoff::BackoffPolicy;
pub use capability::{CapabilityMap, Feature};
pub use config::QueueConfig;
pub use connectivity::{ConnectivitySource, ManualConnectivity, PollingMonitor};
pub use engine::{EnqueueOptions, QueueError, RetryReport, SkipReason, SyncQueue, SyncReport};
pub use handler::{DeliveryError, HandlerRegistry, RemoteHandler};
pub use record::{OfflineRecord, Priority, RecordStatus, RecordType, DEFAULT_MAX_RETRIES};
pub use stats::{SyncStats, TypeStats};
pub use store::{DurableStore, InMemoryStore, RecordFilter, SqliteStore, StorageError};
pub use metrics::DeliveryTimer;
