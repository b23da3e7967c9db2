//! Configuration for the offline queue.
//!
//! # Example
//!
//! ```
//! use agrisync::QueueConfig;
//!
//! // Minimal config (uses defaults)
//! let config = QueueConfig::default();
//! assert_eq!(config.default_max_retries, 3);
//! assert!(config.auto_sync);
//!
//! // Full config
//! let config = QueueConfig {
//!     db_path: Some("./agrisync-queue.db".into()),
//!     default_max_retries: 5,
//!     auto_sync: false,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;
use crate::backoff::BackoffPolicy;

/// Configuration for the offline queue.
///
/// All fields have sensible defaults. For durable operation across restarts,
/// configure `db_path`; without it the queue runs on the in-memory store.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// SQLite file backing the durable store (e.g., "./agrisync-queue.db").
    /// `None` means the caller wires a store explicitly (tests, embedding).
    #[serde(default)]
    pub db_path: Option<String>,

    /// Retry cap applied when `enqueue` gets no per-record override
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Run a sync automatically on the offline -> online transition
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,

    /// Cooldown between retry attempts. `None` (default) retries as fast as
    /// the next sync trigger fires, matching manual retry cadence.
    #[serde(default)]
    pub retry_backoff: Option<BackoffPolicy>,

    /// Polling cadence for the health-probe connectivity monitor (millis)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_retries() -> u32 { 3 }
fn default_auto_sync() -> bool { true }
fn default_poll_interval_ms() -> u64 { 5_000 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            default_max_retries: default_max_retries(),
            auto_sync: default_auto_sync(),
            retry_backoff: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}
