use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use dicebot_common::db;
use dicebot_common::types::{Outcome, RequestStatus, RollRequest};

use super::{ClaimedBatch, RequestStore, StoreError};

/// PostgreSQL-backed request store using `FOR UPDATE SKIP LOCKED` leases.
#[derive(Clone)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestStore for PgRequestStore {
    type Tx = Transaction<'static, Postgres>;

    async fn ping(&self) -> Result<(), StoreError> {
        db::ping(&self.pool).await?;
        Ok(())
    }

    async fn claim_batch(&self, limit: u32) -> Result<ClaimedBatch<Self::Tx>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Dropping `tx` on error rolls back and releases the connection.
        let requests: Vec<RollRequest> = sqlx::query_as(
            r#"
            SELECT request_id, game_id, chat_id, user_id, variant, status,
                   roll_value, requested_at, processed_at
            FROM roll_requests
            WHERE status = 'pending'
            ORDER BY requested_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&mut *tx)
        .await?;

        Ok(ClaimedBatch { tx, requests })
    }

    async fn record_outcome(
        &self,
        tx: &mut Self::Tx,
        request_id: Uuid,
        outcome: Outcome,
    ) -> Result<bool, StoreError> {
        // `clock_timestamp()` is the write time; `NOW()` would be the claim time.
        let result = sqlx::query(
            r#"
            UPDATE roll_requests
            SET status = $2, roll_value = $3, processed_at = clock_timestamp()
            WHERE request_id = $1 AND status = $4
            "#,
        )
        .bind(request_id)
        .bind(outcome.status().to_string())
        .bind(outcome.roll_value())
        .bind(RequestStatus::Pending.to_string())
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.rollback().await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}
