//! In-memory request store for tests.
//!
//! Models the Postgres semantics the worker relies on: claims lease rows and
//! skip rows leased by other open transactions, writes become visible on
//! commit only, and a transaction dropped without commit behaves as rolled back.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use dicebot_common::types::{Outcome, RequestStatus, RollRequest};

use super::{ClaimedBatch, RequestStore, StoreError};

#[derive(Default)]
struct State {
    rows: Vec<RollRequest>,
    leased: HashSet<Uuid>,
    open_connections: usize,
    commits: usize,
    rollbacks: usize,
    closes: usize,
    /// `(commits, open_connections)` when `close` was first called.
    at_close: Option<(usize, usize)>,
    fail_record_for: Option<Uuid>,
    unreachable: bool,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<State>>,
}

pub(crate) struct MemoryTx {
    state: Arc<Mutex<State>>,
    leased: Vec<Uuid>,
    writes: Vec<(Uuid, Outcome, DateTime<Utc>)>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        for id in &self.leased {
            state.leased.remove(id);
        }
        state.open_connections -= 1;
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    /// Insert `count` pending rows for chats `chat-0..chat-{count}`, oldest first.
    pub(crate) fn seeded(count: usize) -> (Self, Vec<Uuid>) {
        let store = Self::default();
        let base = Utc::now() - Duration::minutes(10);
        let ids = (0..count)
            .map(|i| store.insert_pending(&format!("chat-{i}"), None, base + Duration::seconds(i as i64)))
            .collect();
        (store, ids)
    }

    pub(crate) fn insert_pending(
        &self,
        chat_id: &str,
        variant: Option<&str>,
        requested_at: DateTime<Utc>,
    ) -> Uuid {
        let request_id = Uuid::new_v4();
        lock(&self.state).rows.push(RollRequest {
            request_id,
            game_id: "game-1".to_string(),
            chat_id: chat_id.to_string(),
            user_id: "user-1".to_string(),
            variant: variant.map(str::to_string),
            status: RequestStatus::Pending,
            roll_value: None,
            requested_at,
            processed_at: None,
        });
        request_id
    }

    pub(crate) fn get(&self, request_id: Uuid) -> Option<RollRequest> {
        lock(&self.state)
            .rows
            .iter()
            .find(|r| r.request_id == request_id)
            .cloned()
    }

    pub(crate) fn rows(&self) -> Vec<RollRequest> {
        lock(&self.state).rows.clone()
    }

    /// Change a row's status behind the worker's back.
    pub(crate) fn force_status(&self, request_id: Uuid, status: RequestStatus) {
        let mut state = lock(&self.state);
        if let Some(row) = state.rows.iter_mut().find(|r| r.request_id == request_id) {
            row.status = status;
            row.roll_value = (status == RequestStatus::Completed).then_some(6);
            row.processed_at = status.is_terminal().then(Utc::now);
        }
    }

    /// Make `record_outcome` fail for one request.
    pub(crate) fn fail_record_for(&self, request_id: Uuid) {
        lock(&self.state).fail_record_for = Some(request_id);
    }

    pub(crate) fn set_unreachable(&self) {
        lock(&self.state).unreachable = true;
    }

    pub(crate) fn open_connections(&self) -> usize {
        lock(&self.state).open_connections
    }

    pub(crate) fn commits(&self) -> usize {
        lock(&self.state).commits
    }

    pub(crate) fn rollbacks(&self) -> usize {
        lock(&self.state).rollbacks
    }

    pub(crate) fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    pub(crate) fn at_close(&self) -> Option<(usize, usize)> {
        lock(&self.state).at_close
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    type Tx = MemoryTx;

    async fn ping(&self) -> Result<(), StoreError> {
        if lock(&self.state).unreachable {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    async fn claim_batch(&self, limit: u32) -> Result<ClaimedBatch<Self::Tx>, StoreError> {
        let mut state = lock(&self.state);
        if state.unreachable {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }

        let mut candidates: Vec<&RollRequest> = state
            .rows
            .iter()
            .filter(|r| r.status == RequestStatus::Pending && !state.leased.contains(&r.request_id))
            .collect();
        candidates.sort_by_key(|r| r.requested_at);
        let requests: Vec<RollRequest> = candidates
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect();

        let leased: Vec<Uuid> = requests.iter().map(|r| r.request_id).collect();
        state.leased.extend(leased.iter().copied());
        state.open_connections += 1;

        Ok(ClaimedBatch {
            tx: MemoryTx {
                state: Arc::clone(&self.state),
                leased,
                writes: Vec::new(),
            },
            requests,
        })
    }

    async fn record_outcome(
        &self,
        tx: &mut Self::Tx,
        request_id: Uuid,
        outcome: Outcome,
    ) -> Result<bool, StoreError> {
        let state = lock(&self.state);
        if state.fail_record_for == Some(request_id) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }

        let still_pending = state
            .rows
            .iter()
            .any(|r| r.request_id == request_id && r.status == RequestStatus::Pending);
        let already_written = tx.writes.iter().any(|(id, _, _)| *id == request_id);
        if !still_pending || already_written {
            return Ok(false);
        }

        tx.writes.push((request_id, outcome, Utc::now()));
        Ok(true)
    }

    async fn commit(&self, mut tx: Self::Tx) -> Result<(), StoreError> {
        let writes = std::mem::take(&mut tx.writes);
        let mut state = lock(&self.state);
        for (id, outcome, at) in writes {
            if let Some(row) = state.rows.iter_mut().find(|r| r.request_id == id) {
                row.status = outcome.status();
                row.roll_value = outcome.roll_value();
                row.processed_at = Some(at);
            }
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Tx) -> Result<(), StoreError> {
        lock(&self.state).rollbacks += 1;
        Ok(())
    }

    async fn close(&self) {
        let mut state = lock(&self.state);
        state.closes += 1;
        if state.at_close.is_none() {
            state.at_close = Some((state.commits, state.open_connections));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_respects_limit_and_fifo_order() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let newest = store.insert_pending("c", None, now);
        let oldest = store.insert_pending("a", None, now - Duration::minutes(2));
        let middle = store.insert_pending("b", None, now - Duration::minutes(1));

        let batch = store.claim_batch(2).await.unwrap();
        let ids: Vec<Uuid> = batch.requests.iter().map(|r| r.request_id).collect();
        assert_eq!(ids, vec![oldest, middle]);
        assert!(!ids.contains(&newest));
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_leases_and_connection() {
        let (store, _) = MemoryStore::seeded(2);
        let batch = store.claim_batch(5).await.unwrap();
        assert_eq!(batch.requests.len(), 2);
        assert_eq!(store.open_connections(), 1);
        drop(batch);

        assert_eq!(store.open_connections(), 0);
        let again = store.claim_batch(5).await.unwrap();
        assert_eq!(again.requests.len(), 2);
    }
}
