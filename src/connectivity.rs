// Copyright (c) 2025-2026 Agrisync contributors. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connectivity tracking.
//!
//! The orchestrator only ever sees the [`ConnectivitySource`] trait, so the
//! actual signal can come from a host event bridge ([`ManualConnectivity`]),
//! a periodic health probe ([`PollingMonitor`]), or anything else that can
//! drive a watch channel. Two transitions matter: offline -> online is the
//! auto-sync trigger, online -> offline tells a running sync to stop
//! scheduling new work.
//!
//! # Example
//!
//! ```
//! use agrisync::{ConnectivitySource, ManualConnectivity};
//!
//! let monitor = ManualConnectivity::new(true);
//! assert!(monitor.is_online());
//!
//! monitor.set_online(false);
//! assert!(!monitor.is_online());
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Source of the online/offline signal.
///
/// Subscribers get the current state immediately and every transition after.
pub trait ConnectivitySource: Send + Sync {
    /// Current state.
    fn is_online(&self) -> bool;

    /// Watch for transitions.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Host-driven connectivity source.
///
/// The embedding application forwards whatever signal it has (browser events,
/// OS reachability callbacks) into [`set_online`](Self::set_online). Also the
/// natural source for tests.
pub struct ManualConnectivity {
    tx: watch::Sender<bool>,
}

impl ManualConnectivity {
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx }
    }

    /// Report the current state. Only actual transitions are published.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == online {
                false
            } else {
                *state = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity transition");
        }
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivitySource for ManualConnectivity {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Connectivity source driven by a periodic health probe.
///
/// Runs the probe on a fixed cadence and publishes the result. Useful where
/// no OS/browser signal exists, e.g. polling a backend `/health` endpoint
/// over an unreliable rural link.
pub struct PollingMonitor {
    inner: Arc<ManualConnectivity>,
    handle: JoinHandle<()>,
}

impl PollingMonitor {
    /// Start polling. The monitor reports offline until the first probe
    /// completes successfully.
    pub fn spawn<F, Fut>(interval: Duration, probe: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send,
    {
        let inner = Arc::new(ManualConnectivity::new(false));
        let monitor = inner.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let online = probe().await;
                debug!(online, "Connectivity probe completed");
                monitor.set_online(online);
            }
        });

        Self { inner, handle }
    }

    /// Stop the polling task.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for PollingMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl ConnectivitySource for PollingMonitor {
    fn is_online(&self) -> bool {
        self.inner.is_online()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.subscribe()
    }
}
