//! SQLite storage backend for the durable queue.
//!
//! One row per queued record, JSON payload and metadata stored as TEXT:
//!
//! ```sql
//! CREATE TABLE offline_records (
//!   id TEXT PRIMARY KEY,
//!   record_type TEXT NOT NULL,   -- namespaces the keyspace by type
//!   payload TEXT NOT NULL,       -- opaque domain JSON
//!   priority TEXT NOT NULL,
//!   status TEXT NOT NULL,
//!   retry_count INTEGER NOT NULL,
//!   max_retries INTEGER NOT NULL,
//!   last_error TEXT,
//!   last_attempt_at INTEGER,
//!   metadata TEXT NOT NULL,
//!   created_at INTEGER NOT NULL
//! )
//! ```
//!
//! The `(record_type, status)` index serves per-type listing without
//! scanning unrelated namespaces. On open, rows left in `syncing` by a
//! crashed run are normalized back to `pending`.

use std::collections::BTreeMap;
use std::time::Duration;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{info, warn};

use crate::record::{now_millis, OfflineRecord, Priority, RecordStatus, RecordType};
use super::traits::{DurableStore, RecordFilter, StorageError};

/// Connection attempts before giving up at startup.
const CONNECT_ATTEMPTS: u32 = 5;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a queue database at the given path.
    ///
    /// Enables WAL journaling, initializes the schema, and normalizes any
    /// rows stranded in `syncing` by a previous crash back to `pending`.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite://{path}?mode=rwc");
        info!(path, "Opening offline queue database");

        let pool = Self::connect(&url).await?;
        let store = Self { pool };

        store.enable_wal_mode().await?;
        store.init_schema().await?;
        store.normalize_stranded().await?;
        Ok(store)
    }

    /// Connect with startup-mode retry (fails fast if the path is unusable).
    async fn connect(url: &str) -> Result<SqlitePool, StorageError> {
        let mut delay = Duration::from_millis(200);
        let mut attempt = 0;
        loop {
            match SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
            {
                Ok(pool) => return Ok(pool),
                Err(e) => {
                    attempt += 1;
                    if attempt >= CONNECT_ATTEMPTS {
                        return Err(StorageError::Backend(e.to_string()));
                    }
                    warn!(attempt, error = %e, "Queue database connect failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(2));
                }
            }
        }
    }

    /// Enable WAL journal mode (concurrent reads during writes, single fsync).
    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {e}")))?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {e}")))?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS offline_records (
                id TEXT PRIMARY KEY,
                record_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL,
                last_error TEXT,
                last_attempt_at INTEGER,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_offline_records_type_status
             ON offline_records(record_type, status)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    /// Reset rows stranded in `syncing` by a crash mid-run.
    async fn normalize_stranded(&self) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE offline_records SET status = 'pending' WHERE status = 'syncing'",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() > 0 {
            warn!(
                recovered = result.rows_affected(),
                "Recovered records stranded in syncing from a previous run"
            );
        }
        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> Result<OfflineRecord, StorageError> {
        let type_name: String = row
            .try_get("record_type")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let record_type = RecordType::parse(&type_name)
            .ok_or_else(|| StorageError::Serialization(format!("unknown record type '{type_name}'")))?;

        let status_name: String = row
            .try_get("status")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let status = RecordStatus::parse(&status_name)
            .ok_or_else(|| StorageError::Serialization(format!("unknown status '{status_name}'")))?;

        let priority_name: String = row
            .try_get("priority")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let priority = Priority::parse(&priority_name)
            .ok_or_else(|| StorageError::Serialization(format!("unknown priority '{priority_name}'")))?;

        let payload_text: String = row
            .try_get("payload")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let payload = serde_json::from_str(&payload_text)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let metadata_text: String = row
            .try_get("metadata")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_text)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(OfflineRecord {
            id: row.try_get("id").map_err(|e| StorageError::Backend(e.to_string()))?,
            record_type,
            payload,
            created_at: row
                .try_get("created_at")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
            priority,
            status,
            retry_count: row
                .try_get::<i64, _>("retry_count")
                .map_err(|e| StorageError::Backend(e.to_string()))? as u32,
            max_retries: row
                .try_get::<i64, _>("max_retries")
                .map_err(|e| StorageError::Backend(e.to_string()))? as u32,
            last_error: row
                .try_get("last_error")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
            last_attempt_at: row
                .try_get("last_attempt_at")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
            metadata,
        })
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn insert(&self, record: &OfflineRecord) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&record.payload)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO offline_records
                (id, record_type, payload, priority, status, retry_count,
                 max_retries, last_error, last_attempt_at, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&record.id)
        .bind(record.record_type.as_str())
        .bind(payload)
        .bind(record.priority.as_str())
        .bind(record.status.as_str())
        .bind(record.retry_count as i64)
        .bind(record.max_retries as i64)
        .bind(&record.last_error)
        .bind(record.last_attempt_at)
        .bind(metadata)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<OfflineRecord>, StorageError> {
        let row = sqlx::query("SELECT * FROM offline_records WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<OfflineRecord>, StorageError> {
        let mut sql = String::from("SELECT * FROM offline_records WHERE 1 = 1");
        if filter.record_type.is_some() {
            sql.push_str(" AND record_type = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        // Priority only breaks created_at ties; stored as text, so rank it.
        sql.push_str(
            " ORDER BY created_at ASC, \
             CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END, \
             id ASC",
        );

        let mut query = sqlx::query(&sql);
        if let Some(record_type) = filter.record_type {
            query = query.bind(record_type.as_str());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn update_status(
        &self,
        id: &str,
        status: RecordStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        // Single statement keeps the transition atomic per record. retry_count
        // bumps only on entry into `failed` and never passes max_retries.
        let result = sqlx::query(
            r#"
            UPDATE offline_records SET
                status = ?2,
                retry_count = CASE WHEN ?2 = 'failed'
                    THEN MIN(retry_count + 1, max_retries)
                    ELSE retry_count END,
                last_attempt_at = CASE WHEN ?2 = 'failed'
                    THEN ?3
                    ELSE last_attempt_at END,
                last_error = COALESCE(?4, last_error)
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(now_millis())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM offline_records WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_all(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM offline_records")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM offline_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(n as u64)
    }
}
