// Copyright (c) 2025-2026 Agrisync contributors. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Offline record data structures.
//!
//! The [`OfflineRecord`] is the unit that flows through the queue: one local
//! mutation (a new harvest, an order, a listing edit) captured while the
//! device was offline, waiting for delivery to the backend.
//!
//! # Example
//!
//! ```
//! use agrisync::{OfflineRecord, RecordType, Priority, RecordStatus};
//! use serde_json::json;
//!
//! let record = OfflineRecord::new(RecordType::Harvest, json!({"crop": "maize", "kg": 120}));
//!
//! assert_eq!(record.record_type, RecordType::Harvest);
//! assert_eq!(record.status, RecordStatus::Pending);
//! assert_eq!(record.retry_count, 0);
//! assert!(record.created_at > 0);
//! ```

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default retry cap applied when the caller gives no override.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Domain category of a queued mutation.
///
/// Closed set: each variant maps to exactly one remote handler. Dispatch is
/// on the variant, never on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Harvest log entry from a farmer dashboard
    Harvest,
    /// Buyer order (create or update)
    Order,
    /// Marketplace listing
    Listing,
    /// Payment instruction
    Payment,
    /// Shipment status update
    Shipment,
}

impl RecordType {
    /// All record types, in a stable order.
    pub const ALL: [RecordType; 5] = [
        RecordType::Harvest,
        RecordType::Order,
        RecordType::Listing,
        RecordType::Payment,
        RecordType::Shipment,
    ];

    /// Stable wire/storage name for this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Harvest => "harvest",
            Self::Order => "order",
            Self::Listing => "listing",
            Self::Payment => "payment",
            Self::Shipment => "shipment",
        }
    }

    /// Parse a storage name back into a type.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordering hint for the UI. Does not change retry behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery status of a queued record.
///
/// `Completed` is an event, not a state: a record that delivers successfully
/// is removed from the store in the same operation, so `Completed` is never
/// observable in a store snapshot. On restart, any record found in `Syncing`
/// is treated as `Pending` again (a crash mid-run must not wedge it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Waiting for a sync run to pick it up
    Pending,
    /// Currently held by a sync run (in-memory marker, normalized on restart)
    Syncing,
    /// Last delivery attempt failed; retryable until the cap is reached
    Failed,
    /// Delivered. Never persisted - the record is removed instead.
    Completed,
}

impl RecordStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "syncing" => Some(Self::Syncing),
            "failed" => Some(Self::Failed),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A queued mutation awaiting delivery to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineRecord {
    /// Unique identifier, assigned at enqueue time, immutable
    pub id: String,
    /// Domain category; selects the remote handler
    pub record_type: RecordType,
    /// Opaque domain payload; the engine never interprets it
    pub payload: Value,
    /// Creation time (epoch millis); FIFO key within a type
    pub created_at: i64,
    /// Informational ordering hint
    #[serde(default)]
    pub priority: Priority,
    /// Delivery status
    pub status: RecordStatus,
    /// Failed delivery attempts so far; never exceeds `max_retries`
    pub retry_count: u32,
    /// Retry cap, fixed at enqueue time
    pub max_retries: u32,
    /// Diagnostic from the most recent failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Time of the most recent delivery attempt (epoch millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
    /// Opaque extension map for auxiliary data the engine does not require
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl OfflineRecord {
    /// Create a new pending record with a fresh UUID and the default retry cap.
    #[must_use]
    pub fn new(record_type: RecordType, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            record_type,
            payload,
            created_at: now_millis(),
            priority: Priority::default(),
            status: RecordStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            last_error: None,
            last_attempt_at: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Set the priority hint.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Override the retry cap for this record.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Attach extension metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether this record has burned through its retry cap.
    ///
    /// Exhausted records are terminal until manually discarded or cleared.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Current time as epoch millis.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
