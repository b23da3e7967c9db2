use async_trait::async_trait;
use thiserror::Error;
use crate::record::{OfflineRecord, RecordStatus, RecordType};

/// Failure of the durable store itself.
///
/// Fatal to the operation in progress: never converted into a record-level
/// `Failed` status, always surfaced to the caller.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Failed to encode or decode a stored record: {0}")]
    Serialization(String),
}

/// Filter for [`DurableStore::list`]. Empty filter matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub record_type: Option<RecordType>,
    pub status: Option<RecordStatus>,
}

impl RecordFilter {
    /// Match all records.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Match records of one type.
    #[must_use]
    pub fn by_type(record_type: RecordType) -> Self {
        Self { record_type: Some(record_type), status: None }
    }

    /// Match records in one status.
    #[must_use]
    pub fn by_status(status: RecordStatus) -> Self {
        Self { record_type: None, status: Some(status) }
    }

    /// Narrow this filter to one status.
    #[must_use]
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether a record passes this filter.
    #[must_use]
    pub fn matches(&self, record: &OfflineRecord) -> bool {
        self.record_type.map_or(true, |t| record.record_type == t)
            && self.status.map_or(true, |s| record.status == s)
    }
}

/// Single source of truth for queued records.
///
/// All mutations are atomic per record; no partial writes are observable.
/// `list` is read-your-writes consistent with the most recent mutation.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Persist a new record. The record keeps the status it carries
    /// (normally `Pending`). Must succeed while offline; fails only on a
    /// local storage error.
    async fn insert(&self, record: &OfflineRecord) -> Result<(), StorageError>;

    /// Fetch one record by id.
    async fn get(&self, id: &str) -> Result<Option<OfflineRecord>, StorageError>;

    /// List records matching the filter, FIFO by creation time. Same-instant
    /// records order by the priority hint, then by id for a stable order.
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<OfflineRecord>, StorageError>;

    /// Update a record's status.
    ///
    /// Records the error message and attempt time when given, and increments
    /// `retry_count` when transitioning into `Failed` (capped at the record's
    /// `max_retries`). Returns `NotFound` for an absent id.
    async fn update_status(
        &self,
        id: &str,
        status: RecordStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Permanently delete a record. Returns whether it existed.
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;

    /// Delete every record. Returns how many were removed.
    async fn clear_all(&self) -> Result<u64, StorageError>;

    /// Total record count.
    async fn count(&self) -> Result<u64, StorageError>;
}
