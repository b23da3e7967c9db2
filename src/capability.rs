// Copyright (c) 2025-2026 Agrisync contributors. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Runtime capability detection for offline features.
//!
//! Answers, per app feature, whether offline operation is supported by the
//! current runtime: is the configured storage location writable, and is an
//! async runtime available to drive background sync. Pure read, no side
//! effects on the queue; a probe that cannot run simply reports `false`,
//! detection itself never fails.
//!
//! The UI uses the map to decide whether to show offline affordances, and
//! `enqueue` uses it to reject an offline write up front rather than queue a
//! record that can never be durable.

use std::collections::BTreeMap;
use serde::Serialize;
use tracing::debug;

use crate::config::QueueConfig;
use crate::record::RecordType;

/// App feature gated on offline support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Harvests,
    Orders,
    Marketplace,
    Payments,
    Analytics,
    Sync,
}

impl Feature {
    /// All features, in a stable order.
    pub const ALL: [Feature; 6] = [
        Feature::Harvests,
        Feature::Orders,
        Feature::Marketplace,
        Feature::Payments,
        Feature::Analytics,
        Feature::Sync,
    ];

    /// The feature that gates queuing a given record type.
    #[must_use]
    pub fn for_record_type(record_type: RecordType) -> Self {
        match record_type {
            RecordType::Harvest => Self::Harvests,
            RecordType::Order => Self::Orders,
            RecordType::Listing => Self::Marketplace,
            RecordType::Payment => Self::Payments,
            RecordType::Shipment => Self::Orders,
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Harvests => "harvests",
            Self::Orders => "orders",
            Self::Marketplace => "marketplace",
            Self::Payments => "payments",
            Self::Analytics => "analytics",
            Self::Sync => "sync",
        };
        write!(f, "{name}")
    }
}

/// Snapshot of what the current runtime supports.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityMap {
    /// Durable storage is available (in-memory or writable SQLite path)
    pub storage: bool,
    /// An async runtime is present to drive background sync
    pub background_sync: bool,
    /// Per-feature support derived from the two probes above
    pub features: BTreeMap<Feature, bool>,
}

impl CapabilityMap {
    /// Whether a feature can operate offline. Unknown features report `false`.
    #[must_use]
    pub fn supports(&self, feature: Feature) -> bool {
        self.features.get(&feature).copied().unwrap_or(false)
    }
}

/// Probe the runtime and build a capability map for the given config.
///
/// Domain features require storage; `Sync` additionally requires a runtime
/// for the background task.
#[must_use]
pub fn detect(config: &QueueConfig) -> CapabilityMap {
    let storage = probe_storage(config.db_path.as_deref());
    let background_sync = tokio::runtime::Handle::try_current().is_ok();

    let features = Feature::ALL
        .iter()
        .map(|&feature| {
            let supported = match feature {
                Feature::Sync => storage && background_sync,
                _ => storage,
            };
            (feature, supported)
        })
        .collect();

    debug!(storage, background_sync, "Capability probe completed");
    CapabilityMap { storage, background_sync, features }
}

/// Check the storage location is usable without touching the queue itself.
///
/// No path means the in-memory store, which is always available. For a file
/// path, the parent directory must exist and accept a probe file.
fn probe_storage(db_path: Option<&str>) -> bool {
    let Some(path) = db_path else {
        return true;
    };

    let parent = match std::path::Path::new(path).parent() {
        Some(p) if p.as_os_str().is_empty() => std::path::Path::new("."),
        Some(p) => p,
        None => std::path::Path::new("."),
    };
    if !parent.is_dir() {
        return false;
    }

    let probe = parent.join(format!(".agrisync-probe-{}", std::process::id()));
    match std::fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
