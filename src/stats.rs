//! Derived queue statistics.
//!
//! A pure view over a store snapshot: counts by status and by type, plus the
//! session counter of completed deliveries. Recomputed on demand, never
//! persisted, never drives behavior.

use std::collections::BTreeMap;
use serde::Serialize;

use crate::record::{OfflineRecord, RecordStatus, RecordType};

/// Per-type breakdown of queue contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub total: u64,
    pub pending: u64,
    pub syncing: u64,
    pub failed: u64,
}

/// Snapshot of queue state for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Records currently in the store
    pub total: u64,
    pub pending: u64,
    pub syncing: u64,
    pub failed: u64,
    /// Failed records at their retry cap, needing manual intervention
    pub exhausted: u64,
    /// Successful deliveries since the engine was created (session counter;
    /// completed records are removed, so this is the only trace of them)
    pub completed_session: u64,
    /// Breakdown by record type
    pub by_type: BTreeMap<RecordType, TypeStats>,
}

/// Compute stats from a store snapshot.
#[must_use]
pub fn compute(records: &[OfflineRecord], completed_session: u64) -> SyncStats {
    let mut stats = SyncStats {
        completed_session,
        ..Default::default()
    };

    for record in records {
        stats.total += 1;
        let per_type = stats.by_type.entry(record.record_type).or_default();
        per_type.total += 1;

        match record.status {
            RecordStatus::Pending => {
                stats.pending += 1;
                per_type.pending += 1;
            }
            RecordStatus::Syncing => {
                stats.syncing += 1;
                per_type.syncing += 1;
            }
            RecordStatus::Failed => {
                stats.failed += 1;
                per_type.failed += 1;
                if record.is_exhausted() {
                    stats.exhausted += 1;
                }
            }
            // Completed records never appear in a snapshot; counted via the
            // session counter instead.
            RecordStatus::Completed => {}
        }
    }

    stats
}
