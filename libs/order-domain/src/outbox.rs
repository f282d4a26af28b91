//! The outbox store (C1): an append-only log of pending domain events,
//! co-located with the business rows that produce them.
//!
//! Leasing is deliberately a two-step protocol rather than
//! `SELECT ... FOR UPDATE SKIP LOCKED` over the whole batch: `lease_due`
//! is a lock-free snapshot read, and mutual exclusion is only acquired
//! per-row, inside the caller's own transaction, via `lock_for_update`.
//! That way one poisoned row can't wedge a lock on the rest of the batch,
//! and any number of relay workers can lease the same rows concurrently
//! without coordinating — the loser of the race for a given row simply
//! finds it already `done`/`failed` once it acquires the lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{classify_sqlx, DomainError, DomainResult};
use crate::models::{NewOutboxEntry, OutboxEntry, OutboxStatus};

pub const MAX_ATTEMPTS: i32 = 5;

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert inside the caller's transaction. Fails with `DuplicateEventId`
    /// if `entry.id` already exists (the `outbox.id` unique constraint).
    async fn append(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &NewOutboxEntry,
    ) -> DomainResult<()>;

    /// Non-locking snapshot of up to `limit` rows ready for delivery:
    /// `status IN (pending, retry) AND next_attempt_at <= now AND attempts <= MAX_ATTEMPTS`,
    /// ordered by `next_attempt_at` ascending.
    async fn lease_due(&self, limit: i64, now: DateTime<Utc>) -> DomainResult<Vec<OutboxEntry>>;

    /// Acquire a row-level exclusive lock and return the current row, inside
    /// the caller's transaction. `None` if the row no longer exists.
    async fn lock_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> DomainResult<Option<OutboxEntry>>;

    /// Transition a locked row to `done`.
    async fn mark_done(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> DomainResult<()>;

    /// Transition a locked row to `failed` (terminal): poison payload or
    /// permanent RPC error, or attempts exhausted.
    async fn mark_failed(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> DomainResult<()>;

    /// Transition a locked row to `retry`, bumping `attempts` and scheduling
    /// `next_attempt_at`.
    async fn mark_retry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
    ) -> DomainResult<()>;

    /// The pool backing this repository, so callers (the relay) can open
    /// their own transaction to pair the lock-for-update call with the
    /// dispatch-and-transition it protects.
    fn pool(&self) -> &PgPool;
}

pub struct SqlxOutboxRepository {
    pool: PgPool,
}

impl SqlxOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
    async fn append(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &NewOutboxEntry,
    ) -> DomainResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO outbox (
                id, event_type, aggregate_type, aggregate_id, payload,
                status, attempts, next_attempt_at, processed_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6, NULL, $6)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.event_type)
        .bind(&entry.aggregate_type)
        .bind(entry.aggregate_id)
        .bind(&entry.payload)
        .bind(now)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => {
                debug!(event_id = %entry.id, event_type = %entry.event_type, "outbox entry appended");
                Ok(())
            }
            Err(e) if is_duplicate(&e) => Err(DomainError::DuplicateEventId(entry.id)),
            Err(e) => Err(classify_sqlx(e)),
        }
    }

    async fn lease_due(&self, limit: i64, now: DateTime<Utc>) -> DomainResult<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT id, event_type, aggregate_type, aggregate_id, payload,
                   status, attempts, next_attempt_at, processed_at, created_at
            FROM outbox
            WHERE status IN ('pending', 'retry')
              AND next_attempt_at <= $1
              AND attempts <= $2
            ORDER BY next_attempt_at ASC
            LIMIT $3
            "#,
        )
        .bind(now)
        .bind(MAX_ATTEMPTS)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_sqlx)?;

        Ok(rows)
    }

    async fn lock_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> DomainResult<Option<OutboxEntry>> {
        let row = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT id, event_type, aggregate_type, aggregate_id, payload,
                   status, attempts, next_attempt_at, processed_at, created_at
            FROM outbox
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(classify_sqlx)?;

        Ok(row)
    }

    async fn mark_done(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE outbox SET status = 'done', processed_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(processed_at)
        .execute(&mut **tx)
        .await
        .map_err(classify_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("outbox entry {id}")));
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE outbox SET status = 'failed', processed_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(processed_at)
        .execute(&mut **tx)
        .await
        .map_err(classify_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("outbox entry {id}")));
        }
        warn!(event_id = %id, "outbox entry marked failed");
        Ok(())
    }

    async fn mark_retry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE outbox SET status = 'retry', attempts = $2, next_attempt_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(attempts)
        .bind(next_attempt_at)
        .execute(&mut **tx)
        .await
        .map_err(classify_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("outbox entry {id}")));
        }
        Ok(())
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_duplicate(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.code().as_deref() == Some("23505"))
        .unwrap_or(false)
}

/// `backoff(n) = n^2 * BASE`, `BASE = 1s`: 1s, 4s, 9s, 16s, 25s for
/// `attempts` 1..=5. No jitter is required for correctness but ±25% is
/// added to avoid synchronized retries across workers that leased the
/// same row at the same tick.
pub fn compute_backoff(attempts: i32) -> Duration {
    let base_secs = (attempts as u64).saturating_mul(attempts as u64);
    let base = Duration::from_secs(base_secs);
    jitter(base)
}

fn jitter(base: Duration) -> Duration {
    if base.is_zero() {
        return base;
    }
    let factor = rand::thread_rng().gen_range(0.75..1.25);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_quadratic_before_jitter() {
        // jitter is ±25%, so check the midpoint bound loosely instead of exact values
        for (attempts, expected_base) in [(1, 1), (2, 4), (3, 9), (4, 16), (5, 25)] {
            let d = compute_backoff(attempts);
            let lower = Duration::from_secs_f64(expected_base as f64 * 0.75);
            let upper = Duration::from_secs_f64(expected_base as f64 * 1.25);
            assert!(
                d >= lower && d <= upper,
                "attempts={attempts} expected ~{expected_base}s, got {d:?}"
            );
        }
    }

    #[test]
    fn test_backoff_zero_attempts_is_zero() {
        assert_eq!(compute_backoff(0), Duration::ZERO);
    }
}
