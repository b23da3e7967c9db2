//! Durable storage for queued records.
//!
//! The [`traits::DurableStore`] trait is the single seam the orchestrator
//! writes through; [`sqlite::SqliteStore`] is the production backend and
//! [`memory::InMemoryStore`] serves tests and store-less embedding.

pub mod traits;
pub mod memory;
pub mod sqlite;

pub use traits::{DurableStore, RecordFilter, StorageError};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
