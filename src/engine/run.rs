//! The sync run algorithm.
//!
//! One run: snapshot all pending records, group them by type, deliver each
//! type's records sequentially in FIFO order, run the per-type sequences
//! concurrently with each other. FIFO holds within a type; nothing is
//! guaranteed across types, which are independent aggregates.
//!
//! Record failures are isolated: they become `Failed` status and never abort
//! the batch. Only a store fault escapes, and only after every scheduled
//! sequence has settled and the run guard is released.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::time::Instant;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::handler::RemoteHandler;
use crate::metrics::DeliveryTimer;
use crate::record::{now_millis, OfflineRecord, RecordStatus, RecordType};
use crate::store::traits::{RecordFilter, StorageError};

use super::types::{QueueError, RetryReport, SkipReason, SyncReport};
use super::SyncQueue;

/// Releases the re-entrancy guard on every exit path.
struct RunGuard<'a>(&'a std::sync::atomic::AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What became of one dispatched record.
enum Dispatch {
    Delivered,
    Failed,
    /// Record vanished between snapshot and dispatch (manual discard)
    Gone,
}

impl SyncQueue {
    /// Run a sync.
    ///
    /// No-op if a run is already in flight or the device is offline; the
    /// report's `skipped` field says which. If connectivity drops mid-run,
    /// records already dispatched finish and are accounted for, but no
    /// further record is started in any type sequence.
    #[tracing::instrument(skip(self))]
    pub async fn sync(&self) -> Result<SyncReport, QueueError> {
        if self.run_active.swap(true, Ordering::AcqRel) {
            debug!("Sync requested while a run is active, ignoring");
            crate::metrics::record_sync_skipped("already_running");
            return Ok(SyncReport::skipped(SkipReason::AlreadyRunning));
        }
        let _guard = RunGuard(&self.run_active);

        if !self.connectivity.is_online() {
            debug!("Sync requested while offline, refusing to start");
            crate::metrics::record_sync_skipped("offline");
            return Ok(SyncReport::skipped(SkipReason::Offline));
        }

        let start = Instant::now();
        let pending = self
            .store
            .list(&RecordFilter::by_status(RecordStatus::Pending))
            .await?;
        if pending.is_empty() {
            debug!("Nothing pending");
            return Ok(SyncReport::default());
        }

        // The store lists FIFO, so per-type order is preserved by grouping.
        let mut groups: BTreeMap<RecordType, Vec<OfflineRecord>> = BTreeMap::new();
        for record in pending {
            groups.entry(record.record_type).or_default().push(record);
        }

        let jobs = groups
            .into_iter()
            .map(|(record_type, records)| self.sync_type(record_type, records));
        let outcomes = join_all(jobs).await;

        // All sequences have settled; the guard is released on return no
        // matter how many records failed. A store fault still surfaces, but
        // only after the settle.
        let mut report = SyncReport::default();
        let mut first_error: Option<StorageError> = None;
        for outcome in outcomes {
            match outcome {
                Ok((attempted, succeeded, failed)) => {
                    report.attempted += attempted;
                    report.succeeded += succeeded;
                    report.failed += failed;
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }

        crate::metrics::record_sync_run(
            report.attempted,
            report.succeeded,
            report.failed,
            start.elapsed(),
        );
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Sync run finished"
        );
        Ok(report)
    }

    /// Requeue retryable failed records and run a sync.
    ///
    /// Records at their retry cap are left untouched and reported as
    /// `exhausted` so the UI can surface them for manual intervention.
    /// With a backoff policy configured, records still cooling down are
    /// reported as `deferred`.
    #[tracing::instrument(skip(self))]
    pub async fn retry_failed(&self) -> Result<RetryReport, QueueError> {
        let failed = self
            .store
            .list(&RecordFilter::by_status(RecordStatus::Failed))
            .await?;
        let backoff = self.config.read().retry_backoff.clone();
        let now = now_millis();

        let mut report = RetryReport::default();
        for record in failed {
            if record.is_exhausted() {
                report.exhausted += 1;
                continue;
            }
            if let Some(ref policy) = backoff {
                if !policy.is_due(&record, now) {
                    report.deferred += 1;
                    continue;
                }
            }
            match self
                .store
                .update_status(&record.id, RecordStatus::Pending, None)
                .await
            {
                Ok(()) => report.requeued += 1,
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            requeued = report.requeued,
            exhausted = report.exhausted,
            deferred = report.deferred,
            "Requeued failed records"
        );

        report.sync = self.sync().await?;
        Ok(report)
    }

    /// Deliver one type's records sequentially, FIFO.
    ///
    /// Returns `(attempted, succeeded, failed)`. A type with no registered
    /// handler is left alone: its records stay pending rather than burning
    /// retries on a wiring gap.
    async fn sync_type(
        &self,
        record_type: RecordType,
        records: Vec<OfflineRecord>,
    ) -> Result<(usize, usize, usize), StorageError> {
        let Some(handler) = self.handlers.get(record_type) else {
            warn!(
                %record_type,
                count = records.len(),
                "No remote handler registered, leaving records pending"
            );
            return Ok((0, 0, 0));
        };

        let (mut attempted, mut succeeded, mut failed) = (0, 0, 0);
        for record in records {
            if !self.connectivity.is_online() {
                debug!(%record_type, "Connectivity lost mid-run, not scheduling further records");
                break;
            }
            // Single writer per record: skip anything another dispatch holds.
            if !self.in_flight.insert(record.id.clone()) {
                continue;
            }
            let outcome = self.deliver_one(handler.as_ref(), &record).await;
            self.in_flight.remove(&record.id);

            match outcome? {
                Dispatch::Delivered => {
                    attempted += 1;
                    succeeded += 1;
                }
                Dispatch::Failed => {
                    attempted += 1;
                    failed += 1;
                }
                Dispatch::Gone => {}
            }
        }
        Ok((attempted, succeeded, failed))
    }

    /// One delivery attempt: mark syncing, call the handler, then either
    /// remove the record (success) or mark it failed with the diagnostic.
    async fn deliver_one(
        &self,
        handler: &dyn RemoteHandler,
        record: &OfflineRecord,
    ) -> Result<Dispatch, StorageError> {
        match self
            .store
            .update_status(&record.id, RecordStatus::Syncing, None)
            .await
        {
            Ok(()) => {}
            Err(StorageError::NotFound(_)) => return Ok(Dispatch::Gone),
            Err(e) => return Err(e),
        }

        let result = {
            let _timer = DeliveryTimer::new(record.record_type);
            handler.deliver(&record.payload).await
        };

        match result {
            Ok(()) => {
                // Completed is an event, not a state: remove in the same
                // operation that acknowledges success.
                self.store.remove(&record.id).await?;
                self.completed_session.fetch_add(1, Ordering::AcqRel);
                crate::metrics::record_delivery(record.record_type, "success");
                debug!(id = %record.id, record_type = %record.record_type, "Record delivered");
                Ok(Dispatch::Delivered)
            }
            Err(e) => {
                warn!(id = %record.id, error = %e, "Delivery failed");
                crate::metrics::record_delivery(record.record_type, "failed");
                match self
                    .store
                    .update_status(&record.id, RecordStatus::Failed, Some(e.message()))
                    .await
                {
                    Ok(()) | Err(StorageError::NotFound(_)) => Ok(Dispatch::Failed),
                    Err(e) => Err(e),
                }
            }
        }
    }
}
