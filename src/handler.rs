// Copyright (c) 2025-2026 Agrisync contributors. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote delivery boundary.
//!
//! One [`RemoteHandler`] per record type, owned by the API client layer. The
//! contract is deliberately narrow: any `Ok` is a 2xx-equivalent success,
//! any error (including thrown network errors) is a failed attempt carrying
//! a diagnostic string. The engine never interprets response bodies, and
//! per-call timeouts belong inside handler implementations so a hung call
//! degrades to a failed record instead of stalling the run.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::record::RecordType;

/// A failed delivery attempt.
///
/// Both variants count as one failed attempt against the record's retry cap.
/// The split is kept so callers can build handlers that classify 4xx
/// rejections separately from network faults.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Timeout, 5xx, connection refused - worth retrying
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// Remote rejected the payload (4xx-equivalent)
    #[error("payload rejected by remote: {0}")]
    Permanent(String),
}

impl DeliveryError {
    /// Diagnostic recorded on the failed record.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }
}

/// Delivers one record type's payloads to the backend.
#[async_trait]
pub trait RemoteHandler: Send + Sync {
    async fn deliver(&self, payload: &Value) -> Result<(), DeliveryError>;
}

/// Maps each record type to its remote handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<RecordType, Arc<dyn RemoteHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a record type, replacing any previous one.
    #[must_use]
    pub fn register(mut self, record_type: RecordType, handler: Arc<dyn RemoteHandler>) -> Self {
        self.handlers.insert(record_type, handler);
        self
    }

    /// Look up the handler for a type.
    #[must_use]
    pub fn get(&self, record_type: RecordType) -> Option<Arc<dyn RemoteHandler>> {
        self.handlers.get(&record_type).cloned()
    }

    /// Whether any handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
