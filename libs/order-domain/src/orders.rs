//! Order and order-item persistence.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{classify_sqlx, DomainError, DomainResult};
use crate::models::{NewOrder, Order, OrderItem};

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert the order row inside the caller's transaction. Fails with
    /// `DuplicateOrder` if a caller-supplied id collides with an existing row.
    async fn insert_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> DomainResult<()>;

    async fn insert_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        item: &OrderItem,
    ) -> DomainResult<()>;

    async fn get_by_id(&self, id: Uuid) -> DomainResult<Order>;

    /// Monotonic status transition. Setting an order that is already `status`
    /// is a no-op, not an error — this is what makes redelivery of the
    /// payment-authorized event safe.
    async fn update_status(&self, id: Uuid, status: &str) -> DomainResult<()>;

    /// Mark the order as having received its promotion reward, inside the
    /// caller's transaction — called by the reward engine alongside the
    /// reward row insert, so the flag and the row it describes land
    /// atomically.
    async fn mark_reward_given(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        promotion_config_id: Uuid,
    ) -> DomainResult<()>;

    fn pool(&self) -> &PgPool;
}

pub struct SqlxOrderRepository {
    pool: PgPool,
}

impl SqlxOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for SqlxOrderRepository {
    async fn insert_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, total_amount, status, reward_given,
                promotion_config_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            "#,
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.total_amount)
        .bind(&order.status)
        .bind(order.reward_given)
        .bind(order.promotion_config_id)
        .bind(order.created_at)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate(&e) => Err(DomainError::DuplicateOrder(order.id)),
            Err(e) => Err(classify_sqlx(e)),
        }
    }

    async fn insert_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        item: &OrderItem,
    ) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .execute(&mut **tx)
        .await
        .map_err(classify_sqlx)?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> DomainResult<Order> {
        sqlx::query_as::<_, Order>(
            r#"
            SELECT id, customer_id, total_amount, status, reward_given,
                   promotion_config_id, created_at, updated_at
            FROM orders WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx)?
        .ok_or_else(|| DomainError::NotFound(format!("order {id}")))
    }

    async fn update_status(&self, id: Uuid, status: &str) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1 AND status != $2",
        )
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx)?;

        if result.rows_affected() == 0 {
            // Either already in the target status (idempotent no-op) or the
            // order doesn't exist; distinguish so callers can still surface
            // a real NotFound.
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_sqlx)?;

            if !exists {
                return Err(DomainError::NotFound(format!("order {id}")));
            }
        }
        Ok(())
    }

    async fn mark_reward_given(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        promotion_config_id: Uuid,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET reward_given = TRUE, promotion_config_id = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(promotion_config_id)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(classify_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("order {id}")));
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

/// Validate a raw command before any transaction opens: every constraint
/// is checked up front so a malformed command never takes a connection
/// out of the pool.
pub fn validate_new_order(cmd: &NewOrder) -> DomainResult<()> {
    if cmd.total_amount <= 0.0 {
        return Err(DomainError::Validation(
            "total_amount must be > 0".to_string(),
        ));
    }
    if cmd.items.is_empty() {
        return Err(DomainError::Validation(
            "order must have at least one item".to_string(),
        ));
    }
    for item in &cmd.items {
        if item.quantity <= 0 {
            return Err(DomainError::Validation(format!(
                "item {} quantity must be > 0",
                item.product_id
            )));
        }
        if item.unit_price <= 0.0 {
            return Err(DomainError::Validation(format!(
                "item {} unit_price must be > 0",
                item.product_id
            )));
        }
    }
    Ok(())
}
