//! Row types for the five tables the pipeline owns: `orders`, `order_items`,
//! `outbox`, `promotion_configs`, `promotion_rewards`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: f64,
    pub status: String,
    pub reward_given: bool,
    pub promotion_config_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub mod order_status {
    pub const PENDING: &str = "pending";
    pub const AUTHORIZED: &str = "authorized";
    pub const CANCELLED: &str = "cancelled";
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: f64,
}

/// A single line the caller asked `create_order` to persist. Validated before
/// the transaction opens; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: f64,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Option<Uuid>,
    pub customer_id: Uuid,
    pub total_amount: f64,
    pub status: String,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "outbox_status", rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Retry,
    Done,
    Failed,
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Retry => "retry",
            OutboxStatus::Done => "done",
            OutboxStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub mod event_type {
    pub const PAYMENT_REQUIRED: &str = "payment_required";
    pub const PROMOTION_REWARD_CREATED: &str = "promotion.reward.created";
}

pub mod aggregate_type {
    pub const ORDER: &str = "order";
    pub const PROMOTION_REWARD: &str = "promotion_reward";
}

/// A new row to append to the outbox. `id` is always supplied by the caller
/// (application-side UUID authority, see DESIGN.md) rather than generated by
/// the database, so it can double as the event's idempotency key before the
/// row is ever read back.
#[derive(Debug, Clone)]
pub struct NewOutboxEntry {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, FromRow)]
pub struct PromotionConfig {
    pub id: Uuid,
    pub name: String,
    pub customer_limit: i32,
    pub reward_limit: i32,
    pub min_order_value: f64,
    pub is_active: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PromotionReward {
    pub id: Uuid,
    pub promotion_config_id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub received_at: DateTime<Utc>,
}

/// Wire payload for the `payment_required` outbox event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequiredPayload {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub amount: f64,
    pub status: String,
    pub event_id: Uuid,
}

/// Inbound `payment_authorized` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorizedEvent {
    pub payment_id: String,
    pub order_id: Uuid,
    pub idempotency_key: String,
    pub amount: f64,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "AUTHORIZED")]
    Authorized,
    #[serde(rename = "DECLINED")]
    Declined,
}

/// Published on `promotion_rewards`, consumed by the reward engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRewardEvent {
    pub order_id: Uuid,
}

/// Published (through the outbox) on `promotion.reward.created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRewardCreatedPayload {
    pub reward_id: Uuid,
    pub order_id: Uuid,
}
