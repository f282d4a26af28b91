//! Promotion configuration and reward bookkeeping (C6's repository layer).
//!
//! Grounded on the original Go `PromotionRepository` — with one deliberate
//! fix. The original's customer-limit check counted rows returned by
//! `.Select("customer_id").Count()`, but GORM's `Count` ignores the
//! `Select` projection and counts every matching reward row, not distinct
//! customers. A customer who somehow received two rewards under the same
//! promotion would be counted twice against the limit. `count_distinct_customers`
//! below does the count with an explicit `COUNT(DISTINCT customer_id)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{classify_sqlx, DomainError, DomainResult};
use crate::models::PromotionConfig;
use crate::models::PromotionReward;

#[async_trait]
pub trait PromotionRepository: Send + Sync {
    /// The promotion active at `at`: `is_active` and `start_time <= at <= end_time`.
    /// `NotFound` if none (caller maps this to the `NoActivePromotion` policy reject).
    async fn get_active_promotion(&self, at: DateTime<Utc>) -> DomainResult<PromotionConfig>;

    /// Run inside the caller's serializable transaction: read-your-writes
    /// with `count_distinct_customers`/`count_rewards`/`create_reward` is
    /// what lets the quota checks and the insert they gate observe a single
    /// consistent snapshot instead of racing against a concurrent worker's
    /// own check-then-insert.
    async fn has_customer_received(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        promotion_id: Uuid,
        customer_id: Uuid,
    ) -> DomainResult<bool>;

    /// Number of distinct customers who have received a reward under this
    /// promotion. Uses `COUNT(DISTINCT customer_id)`. Run inside the
    /// caller's transaction; see `has_customer_received`.
    async fn count_distinct_customers(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        promotion_id: Uuid,
    ) -> DomainResult<i64>;

    /// Total reward rows issued under this promotion, regardless of customer.
    /// Run inside the caller's transaction; see `has_customer_received`.
    async fn count_rewards(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        promotion_id: Uuid,
    ) -> DomainResult<i64>;

    /// Insert the reward row inside the caller's transaction. Fails with
    /// `DomainError::Permanent` if the `(promotion_config_id, customer_id)`
    /// unique index is violated by a redelivered event racing this insert.
    async fn create_reward(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reward: &PromotionReward,
    ) -> DomainResult<()>;

    fn pool(&self) -> &PgPool;
}

pub struct SqlxPromotionRepository {
    pool: PgPool,
}

impl SqlxPromotionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromotionRepository for SqlxPromotionRepository {
    async fn get_active_promotion(&self, at: DateTime<Utc>) -> DomainResult<PromotionConfig> {
        sqlx::query_as::<_, PromotionConfig>(
            r#"
            SELECT id, name, customer_limit, reward_limit, min_order_value,
                   is_active, start_time, end_time
            FROM promotion_configs
            WHERE is_active = TRUE AND start_time <= $1 AND end_time >= $1
            ORDER BY start_time DESC
            LIMIT 1
            "#,
        )
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx)?
        .ok_or_else(|| DomainError::NotFound("no active promotion".to_string()))
    }

    async fn has_customer_received(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        promotion_id: Uuid,
        customer_id: Uuid,
    ) -> DomainResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM promotion_rewards
                WHERE promotion_config_id = $1 AND customer_id = $2
            )
            "#,
        )
        .bind(promotion_id)
        .bind(customer_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(classify_sqlx)
    }

    async fn count_distinct_customers(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        promotion_id: Uuid,
    ) -> DomainResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT customer_id)
            FROM promotion_rewards
            WHERE promotion_config_id = $1
            "#,
        )
        .bind(promotion_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(classify_sqlx)
    }

    async fn count_rewards(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        promotion_id: Uuid,
    ) -> DomainResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM promotion_rewards WHERE promotion_config_id = $1",
        )
        .bind(promotion_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(classify_sqlx)
    }

    async fn create_reward(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reward: &PromotionReward,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO promotion_rewards (id, promotion_config_id, order_id, customer_id, received_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(reward.id)
        .bind(reward.promotion_config_id)
        .bind(reward.order_id)
        .bind(reward.customer_id)
        .bind(reward.received_at)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if crate::error::is_unique_violation(&e) => Err(DomainError::Permanent(
                format!("customer {} already rewarded under promotion {}", reward.customer_id, reward.promotion_config_id),
            )),
            Err(e) => Err(classify_sqlx(e)),
        }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}
