//! Storage adapter for the `roll_requests` work queue.
//!
//! A claim opens a transaction and leases up to `limit` pending rows, oldest
//! first, skipping rows another transaction already holds. Outcomes are written
//! under that same transaction, which the caller then commits or rolls back.
//!
//! The transaction handle owns the pooled connection. Committing, rolling back
//! or dropping it returns the connection to the pool, so every exit path of a
//! cycle releases it.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use dicebot_common::types::{Outcome, RollRequest};

pub mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use postgres::PgRequestStore;

/// Errors raised by a request store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Rows leased by one claim, together with the transaction holding the leases.
pub struct ClaimedBatch<T> {
    pub tx: T,
    pub requests: Vec<RollRequest>,
}

/// Transactional claim / update primitives over the request queue.
#[async_trait]
pub trait RequestStore: Send + Sync + 'static {
    /// Open transaction holding row leases and a pooled connection.
    type Tx: Send;

    /// Lightweight round trip used as a startup connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Begin a transaction and lease up to `limit` pending rows, oldest first.
    ///
    /// Rows leased by concurrent transactions are skipped, never waited on.
    /// An empty batch still returns the open transaction.
    async fn claim_batch(&self, limit: u32) -> Result<ClaimedBatch<Self::Tx>, StoreError>;

    /// Write a terminal outcome for `request_id` if the row is still pending.
    ///
    /// Returns whether a row was updated.
    async fn record_outcome(
        &self,
        tx: &mut Self::Tx,
        request_id: Uuid,
        outcome: Outcome,
    ) -> Result<bool, StoreError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;

    /// Close the underlying pool. Idle connections are released immediately.
    async fn close(&self);
}
