//! Order command service (C2): the one synchronous entry point into the
//! pipeline. Everything downstream of a successful `create_order` call is
//! asynchronous and driven off the outbox row it commits.

use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::DomainResult;
use crate::models::{
    aggregate_type, event_type, NewOrder, NewOrderItem, NewOutboxEntry, Order, OrderItem,
    PaymentRequiredPayload,
};
use crate::orders::{validate_new_order, OrderRepository};
use crate::outbox::OutboxRepository;

#[derive(Debug, Clone)]
pub struct OrderSummary {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: f64,
    pub status: String,
}

pub struct OrderCommandService<O: OrderRepository, X: OutboxRepository> {
    pool: PgPool,
    orders: Arc<O>,
    outbox: Arc<X>,
}

impl<O: OrderRepository, X: OutboxRepository> OrderCommandService<O, X> {
    pub fn new(pool: PgPool, orders: Arc<O>, outbox: Arc<X>) -> Self {
        Self {
            pool,
            orders,
            outbox,
        }
    }

    /// Open one transaction; insert the order row; insert each order item;
    /// append a `payment_required` outbox entry; commit. After a successful
    /// commit, the order and all items are persisted and exactly one outbox
    /// entry exists for this order's `payment_required` event. On any
    /// failure before commit, no state is visible.
    pub async fn create_order(&self, cmd: NewOrder) -> DomainResult<OrderSummary> {
        validate_new_order(&cmd)?;

        let order_id = cmd.id.unwrap_or_else(Uuid::new_v4);
        let now = Utc::now();

        let order = Order {
            id: order_id,
            customer_id: cmd.customer_id,
            total_amount: cmd.total_amount,
            status: cmd.status.clone(),
            reward_given: false,
            promotion_config_id: None,
            created_at: now,
            updated_at: now,
        };

        let items: Vec<OrderItem> = cmd
            .items
            .iter()
            .map(|i: &NewOrderItem| OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: i.product_id,
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect();

        let event_id = Uuid::new_v4();
        let payload = PaymentRequiredPayload {
            order_id,
            customer_id: cmd.customer_id,
            amount: cmd.total_amount,
            status: cmd.status.clone(),
            event_id,
        };
        let outbox_entry = NewOutboxEntry {
            id: event_id,
            event_type: event_type::PAYMENT_REQUIRED.to_string(),
            aggregate_type: aggregate_type::ORDER.to_string(),
            aggregate_id: order_id,
            payload: serde_json::to_value(&payload)?,
        };

        let mut tx = self.pool.begin().await.map_err(crate::error::classify_sqlx)?;

        self.orders.insert_order(&mut tx, &order).await?;
        for item in &items {
            self.orders.insert_item(&mut tx, item).await?;
        }
        self.outbox.append(&mut tx, &outbox_entry).await?;

        tx.commit().await.map_err(crate::error::classify_sqlx)?;

        Ok(OrderSummary {
            order_id,
            customer_id: order.customer_id,
            total_amount: order.total_amount,
            status: order.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_items() {
        let cmd = NewOrder {
            id: None,
            customer_id: Uuid::new_v4(),
            total_amount: 10.0,
            status: "pending".to_string(),
            items: vec![],
        };
        assert!(validate_new_order(&cmd).is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_amount() {
        let cmd = NewOrder {
            id: None,
            customer_id: Uuid::new_v4(),
            total_amount: 0.0,
            status: "pending".to_string(),
            items: vec![NewOrderItem {
                product_id: Uuid::new_v4(),
                quantity: 1,
                unit_price: 5.0,
            }],
        };
        assert!(validate_new_order(&cmd).is_err());
    }

    #[test]
    fn test_validate_accepts_well_formed_command() {
        let cmd = NewOrder {
            id: None,
            customer_id: Uuid::new_v4(),
            total_amount: 120.00,
            status: "pending".to_string(),
            items: vec![NewOrderItem {
                product_id: Uuid::new_v4(),
                quantity: 2,
                unit_price: 60.00,
            }],
        };
        assert!(validate_new_order(&cmd).is_ok());
    }
}
