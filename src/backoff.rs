// Copyright (c) 2025-2026 Agrisync contributors. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry pacing for failed records.
//!
//! The queue does not delay between attempts by default: a failed record is
//! eligible again as soon as the next manual or automatic retry fires. When a
//! [`BackoffPolicy`] is configured, `retry_failed` additionally requires the
//! record to have cooled down for an exponentially growing window based on
//! its `retry_count`.
//!
//! # Example
//!
//! ```
//! use agrisync::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::default();
//! assert_eq!(policy.delay_for(0), Duration::from_secs(0));
//! assert_eq!(policy.delay_for(1), Duration::from_secs(5));
//! assert_eq!(policy.delay_for(2), Duration::from_secs(10));
//! ```

use std::time::Duration;
use serde::Deserialize;
use crate::record::OfflineRecord;

/// Exponential backoff window applied between delivery attempts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the second attempt (millis)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound on the delay (millis)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor per failed attempt
    #[serde(default = "default_factor")]
    pub factor: f64,
}

fn default_initial_delay_ms() -> u64 { 5_000 }
fn default_max_delay_ms() -> u64 { 300_000 } // Cap at 5 minutes
fn default_factor() -> f64 { 2.0 }

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            factor: default_factor(),
        }
    }
}

impl BackoffPolicy {
    /// Cooldown required after `retry_count` failed attempts.
    ///
    /// Zero attempts means no wait; each further attempt multiplies the
    /// window by `factor`, capped at `max_delay_ms`.
    #[must_use]
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }
        let exponent = (retry_count - 1).min(32);
        let millis = (self.initial_delay_ms as f64) * self.factor.powi(exponent as i32);
        Duration::from_millis((millis as u64).min(self.max_delay_ms))
    }

    /// Whether a failed record has cooled down enough to requeue.
    ///
    /// Records with no recorded attempt time are always due.
    #[must_use]
    pub fn is_due(&self, record: &OfflineRecord, now_millis: i64) -> bool {
        match record.last_attempt_at {
            None => true,
            Some(at) => {
                let elapsed = now_millis.saturating_sub(at);
                elapsed >= self.delay_for(record.retry_count).as_millis() as i64
            }
        }
    }
}
