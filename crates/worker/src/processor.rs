//! Request processor.
//!
//! Turns one leased row into a terminal outcome:
//! 1. Resolve the variant (row tag or the default die)
//! 2. Call the notification channel, bounded by a per-call timeout
//! 3. Map the result to `completed` / `error`
//! 4. Record the outcome under the claim transaction
//!
//! Delivery failures are recorded on the row and never abort the batch.
//! Rate limiting leaves the row untouched and is returned as `Throttled`.
//! Store failures and other channel failures that are not specific to the row
//! are returned to the caller, which rolls the whole batch back.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use dicebot_common::types::{DiceVariant, Outcome, RollRequest};
use dicebot_notifier::{ChannelError, NotificationChannel};

use crate::store::{RequestStore, StoreError};

/// How a single row ended up after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowResult {
    Completed(i16),
    Failed,
    /// The row had already left `pending`; nothing was written.
    Conflict,
}

/// Failures that stop the batch at the current row.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The channel refused the call for now; the row was not attempted.
    #[error("Rate limited (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    #[error("Unclassified channel failure: {0}")]
    Channel(ChannelError),
}

pub struct RequestProcessor<C: ?Sized> {
    channel: Arc<C>,
    call_timeout: Duration,
}

impl<C> RequestProcessor<C>
where
    C: NotificationChannel + ?Sized,
{
    pub fn new(channel: Arc<C>, call_timeout: Duration) -> Self {
        Self {
            channel,
            call_timeout,
        }
    }

    /// Process one leased request and record its outcome under `tx`.
    pub async fn process<S: RequestStore>(
        &self,
        store: &S,
        tx: &mut S::Tx,
        request: &RollRequest,
    ) -> Result<RowResult, ProcessError> {
        let outcome = self.resolve_outcome(request).await?;

        let updated = store
            .record_outcome(tx, request.request_id, outcome)
            .await?;

        if !updated {
            tracing::warn!(
                request_id = %request.request_id,
                "Request no longer pending, outcome not recorded"
            );
            return Ok(RowResult::Conflict);
        }

        tracing::debug!(
            request_id = %request.request_id,
            status = %outcome.status(),
            roll_value = outcome.roll_value(),
            "Outcome recorded"
        );

        Ok(match outcome.roll_value() {
            Some(value) => RowResult::Completed(value),
            None => RowResult::Failed,
        })
    }

    async fn resolve_outcome(&self, request: &RollRequest) -> Result<Outcome, ProcessError> {
        let variant = match DiceVariant::resolve(request.variant.as_deref()) {
            Ok(variant) => variant,
            Err(e) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    error = %e,
                    "Unsupported variant, marking request as error"
                );
                return Ok(Outcome::error());
            }
        };

        let call = self.channel.send_random_event(&request.chat_id, variant);
        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(self.call_timeout)),
        };

        match result {
            Ok(value) => {
                let outcome = Outcome::from_roll(value);
                if !outcome.is_completed() {
                    tracing::warn!(
                        request_id = %request.request_id,
                        value,
                        "Channel returned an out-of-range value"
                    );
                }
                Ok(outcome)
            }
            Err(e) if e.is_delivery_failure() => {
                tracing::warn!(
                    request_id = %request.request_id,
                    chat_id = %request.chat_id,
                    variant = %variant,
                    error = %e,
                    "Delivery failed, marking request as error"
                );
                Ok(Outcome::error())
            }
            Err(ChannelError::RateLimited { retry_after }) => Err(ProcessError::Throttled {
                retry_after: retry_after.map(Duration::from_secs),
            }),
            Err(e) => Err(ProcessError::Channel(e)),
        }
    }
}
