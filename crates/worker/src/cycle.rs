//! One claim → process → commit batch cycle.

use std::sync::Arc;
use std::time::Duration;

use dicebot_notifier::NotificationChannel;

use crate::processor::{ProcessError, RequestProcessor, RowResult};
use crate::store::{ClaimedBatch, RequestStore, StoreError};

/// Per-row tallies for a committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub conflicts: usize,
}

/// What a cycle did with its claim transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was pending; the empty transaction was committed.
    Empty,
    Committed(CycleReport),
    /// The channel rate-limited the batch. Rows handled before that point were
    /// committed; the remaining `deferred` rows stay pending untouched.
    Throttled {
        report: CycleReport,
        deferred: usize,
        retry_after: Option<Duration>,
    },
    /// An unclassified failure aborted the batch; every claimed row stays pending.
    RolledBack { claimed: usize, reason: String },
}

/// Runs batch cycles against a store and a notification channel.
pub struct BatchCycle<S, C: ?Sized> {
    store: Arc<S>,
    processor: RequestProcessor<C>,
    max_batch_size: u32,
}

impl<S, C> BatchCycle<S, C>
where
    S: RequestStore,
    C: NotificationChannel + ?Sized,
{
    pub fn new(store: Arc<S>, processor: RequestProcessor<C>, max_batch_size: u32) -> Self {
        Self {
            store,
            processor,
            max_batch_size,
        }
    }

    /// Run one cycle.
    ///
    /// Rows are processed sequentially in claim order. Errors from claiming,
    /// committing or rolling back are returned; the transaction is released
    /// either way and the rows are left for a later cycle.
    ///
    /// Rate limiting stops the batch at the throttled row and commits what was
    /// already delivered, so no chat is rolled for twice.
    pub async fn run(&self) -> Result<CycleOutcome, StoreError> {
        let ClaimedBatch { mut tx, requests } =
            self.store.claim_batch(self.max_batch_size).await?;

        if requests.is_empty() {
            self.store.commit(tx).await?;
            tracing::debug!("No pending requests");
            return Ok(CycleOutcome::Empty);
        }

        let mut report = CycleReport {
            claimed: requests.len(),
            ..CycleReport::default()
        };
        tracing::info!(claimed = report.claimed, "Claimed pending requests");

        for (index, request) in requests.iter().enumerate() {
            match self.processor.process(&*self.store, &mut tx, request).await {
                Ok(RowResult::Completed(_)) => report.completed += 1,
                Ok(RowResult::Failed) => report.failed += 1,
                Ok(RowResult::Conflict) => report.conflicts += 1,
                Err(ProcessError::Throttled { retry_after }) => {
                    let deferred = report.claimed - index;
                    self.store.commit(tx).await?;
                    tracing::warn!(
                        request_id = %request.request_id,
                        completed = report.completed,
                        failed = report.failed,
                        deferred,
                        retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                        "Rate limited, committed delivered rows and deferred the rest"
                    );
                    return Ok(CycleOutcome::Throttled {
                        report,
                        deferred,
                        retry_after,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %request.request_id,
                        claimed = report.claimed,
                        error = %e,
                        "Batch aborted, rolling back"
                    );
                    self.store.rollback(tx).await?;
                    return Ok(CycleOutcome::RolledBack {
                        claimed: report.claimed,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.store.commit(tx).await?;
        tracing::info!(
            claimed = report.claimed,
            completed = report.completed,
            failed = report.failed,
            conflicts = report.conflicts,
            "Batch committed"
        );

        Ok(CycleOutcome::Committed(report))
    }
}
