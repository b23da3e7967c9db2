//! Public types for the sync orchestrator.

use thiserror::Error;

use crate::capability::Feature;
use crate::store::traits::StorageError;

/// Error surface of the queue API.
///
/// Record-level delivery failures never appear here; they are converted to
/// `Failed` status inside a run. Only store faults and up-front capability
/// rejections reach the caller.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("offline support for '{0}' is unavailable in this runtime")]
    CapabilityUnavailable(Feature),
}

/// Why a sync trigger did not start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another run is already in flight
    AlreadyRunning,
    /// The device is offline
    Offline,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "already running"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    /// Records dispatched to a remote handler
    pub attempted: usize,
    /// Records delivered and removed
    pub succeeded: usize,
    /// Records marked failed
    pub failed: usize,
    /// Set when the trigger was a no-op
    pub skipped: Option<SkipReason>,
}

impl SyncReport {
    pub(crate) fn skipped(reason: SkipReason) -> Self {
        Self { skipped: Some(reason), ..Default::default() }
    }

    /// Whether every attempted record was delivered.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_none() && self.failed == 0
    }
}

/// Outcome of a retry-failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryReport {
    /// Failed records reset to pending
    pub requeued: usize,
    /// Records at their retry cap, left untouched for manual intervention
    pub exhausted: usize,
    /// Records still inside their backoff window
    pub deferred: usize,
    /// The sync run triggered after requeuing
    pub sync: SyncReport,
}
