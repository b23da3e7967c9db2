use async_trait::async_trait;
use dashmap::DashMap;
use crate::record::{now_millis, OfflineRecord, RecordStatus};
use super::traits::{DurableStore, RecordFilter, StorageError};

/// In-memory store backed by a concurrent map.
///
/// Not durable across restarts; used by tests and as the fallback when no
/// database path is configured.
pub struct InMemoryStore {
    records: DashMap<String, OfflineRecord>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self { records: DashMap::new() }
    }

    /// Get current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared status-transition bookkeeping for store backends.
///
/// Sets the new status, stamps the attempt time and error on a failure, and
/// bumps `retry_count` when entering `Failed` without ever exceeding the cap.
pub(crate) fn apply_status(record: &mut OfflineRecord, status: RecordStatus, error: Option<&str>) {
    if status == RecordStatus::Failed {
        record.retry_count = (record.retry_count + 1).min(record.max_retries);
        record.last_attempt_at = Some(now_millis());
    }
    if let Some(message) = error {
        record.last_error = Some(message.to_string());
    }
    record.status = status;
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn insert(&self, record: &OfflineRecord) -> Result<(), StorageError> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<OfflineRecord>, StorageError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<OfflineRecord>, StorageError> {
        let mut matched: Vec<OfflineRecord> = self
            .records
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        matched.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.priority.cmp(&b.priority))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(matched)
    }

    async fn update_status(
        &self,
        id: &str,
        status: RecordStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        apply_status(entry.value_mut(), status, error);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.records.remove(id).is_some())
    }

    async fn clear_all(&self) -> Result<u64, StorageError> {
        let count = self.records.len() as u64;
        self.records.clear();
        Ok(count)
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;
    use serde_json::json;

    fn harvest(id_hint: &str) -> OfflineRecord {
        let mut record = OfflineRecord::new(RecordType::Harvest, json!({"plot": id_hint}));
        record.id = id_hint.to_string();
        record
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryStore::new();
        let record = harvest("r1");

        store.insert(&record).await.unwrap();

        let fetched = store.get("r1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "r1");
        assert_eq!(fetched.status, RecordStatus::Pending);
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = InMemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_fifo_within_type() {
        let store = InMemoryStore::new();

        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let mut record = harvest(id);
            record.created_at = 1_000 + i as i64;
            store.insert(&record).await.unwrap();
        }

        let listed = store.list(&RecordFilter::by_type(RecordType::Harvest)).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_list_breaks_created_at_ties_by_priority() {
        let store = InMemoryStore::new();

        for (id, priority) in [
            ("z-low", crate::record::Priority::Low),
            ("m-medium", crate::record::Priority::Medium),
            ("a-high", crate::record::Priority::High),
        ] {
            let mut record = harvest(id).with_priority(priority);
            record.created_at = 1_000;
            store.insert(&record).await.unwrap();
        }

        let listed = store.list(&RecordFilter::all()).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a-high", "m-medium", "z-low"]);
    }

    #[tokio::test]
    async fn test_list_filters_by_type_and_status() {
        let store = InMemoryStore::new();
        store.insert(&harvest("h1")).await.unwrap();
        store
            .insert(&OfflineRecord::new(RecordType::Order, json!({})))
            .await
            .unwrap();

        store
            .update_status("h1", RecordStatus::Failed, Some("boom"))
            .await
            .unwrap();

        let failed = store
            .list(&RecordFilter::by_status(RecordStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "h1");

        let pending_harvests = store
            .list(&RecordFilter::by_type(RecordType::Harvest).with_status(RecordStatus::Pending))
            .await
            .unwrap();
        assert!(pending_harvests.is_empty());
    }

    #[tokio::test]
    async fn test_failed_transition_bumps_retry_count() {
        let store = InMemoryStore::new();
        store.insert(&harvest("h1")).await.unwrap();

        store
            .update_status("h1", RecordStatus::Failed, Some("timeout"))
            .await
            .unwrap();

        let record = store.get("h1").await.unwrap().unwrap();
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.last_error.as_deref(), Some("timeout"));
        assert!(record.last_attempt_at.is_some());
    }

    #[tokio::test]
    async fn test_retry_count_never_exceeds_cap() {
        let store = InMemoryStore::new();
        let record = harvest("h1").with_max_retries(2);
        store.insert(&record).await.unwrap();

        for _ in 0..5 {
            store
                .update_status("h1", RecordStatus::Failed, Some("down"))
                .await
                .unwrap();
        }

        let record = store.get("h1").await.unwrap().unwrap();
        assert_eq!(record.retry_count, 2);
    }

    #[tokio::test]
    async fn test_requeue_keeps_last_error() {
        let store = InMemoryStore::new();
        store.insert(&harvest("h1")).await.unwrap();

        store
            .update_status("h1", RecordStatus::Failed, Some("503"))
            .await
            .unwrap();
        store
            .update_status("h1", RecordStatus::Pending, None)
            .await
            .unwrap();

        let record = store.get("h1").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Pending);
        assert_eq!(record.last_error.as_deref(), Some("503"));
        assert_eq!(record.retry_count, 1);
    }

    #[tokio::test]
    async fn test_update_status_nonexistent_errors() {
        let store = InMemoryStore::new();
        let result = store
            .update_status("ghost", RecordStatus::Failed, None)
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemoryStore::new();
        store.insert(&harvest("h1")).await.unwrap();

        assert!(store.remove("h1").await.unwrap());
        assert!(!store.remove("h1").await.unwrap());
        assert!(store.get("h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let store = InMemoryStore::new();
        for i in 0..4 {
            store.insert(&harvest(&format!("h{i}"))).await.unwrap();
        }

        assert_eq!(store.clear_all().await.unwrap(), 4);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let record =
                        OfflineRecord::new(RecordType::Listing, json!({"b": batch, "i": i}));
                    store.insert(&record).await.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 100);
    }
}
