//! Delivery backends for outbox entries. The relay's per-entry state machine
//! is the same regardless of what "invoke the RPC" means for a given
//! event type: `payment_required` rows call the Payment service; every other
//! event type this pipeline appends to the outbox (`promotion.reward.created`)
//! is a plain bus publish. `CompositeDispatcher` routes by `event_type` so the
//! relay loop itself never branches on it.

use async_trait::async_trait;
use event_bus::EventProducer;
use order_domain::models::{
    event_type, OutboxEntry, PaymentRequiredPayload,
};
use payment_client::{PayRequest, PaymentClient};
use std::sync::Arc;

#[derive(Debug)]
pub enum DeliveryError {
    Transient(String),
    Permanent(String),
}

#[async_trait]
pub trait OutboxDispatcher: Send + Sync {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), DeliveryError>;
}

pub struct PaymentDispatcher {
    pub client: Arc<PaymentClient>,
}

#[async_trait]
impl OutboxDispatcher for PaymentDispatcher {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), DeliveryError> {
        let payload: PaymentRequiredPayload = serde_json::from_value(entry.payload.clone())
            .map_err(|e| DeliveryError::Permanent(format!("undecodable payload: {e}")))?;

        let req = PayRequest {
            order_id: payload.order_id,
            customer_id: payload.customer_id,
            amount: payload.amount,
            status: payload.status,
            // the outbox entry id doubles as the idempotency key
            event_id: entry.id,
        };

        match self.client.pay(req).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_transient() => Err(DeliveryError::Transient(e.to_string())),
            Err(e) => Err(DeliveryError::Permanent(e.to_string())),
        }
    }
}

pub struct KafkaDispatcher {
    pub producer: Arc<dyn EventProducer>,
    pub topic: String,
}

#[async_trait]
impl OutboxDispatcher for KafkaDispatcher {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), DeliveryError> {
        self.producer
            .publish(
                &self.topic,
                &entry.aggregate_id.to_string(),
                entry.id,
                &entry.event_type,
                &entry.payload,
            )
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))
    }
}

/// Routes by `event_type`. An event type with no registered dispatcher is
/// poison — the relay marks the row `failed` without ever dialing out.
pub struct CompositeDispatcher {
    payment: PaymentDispatcher,
    promotion_reward: KafkaDispatcher,
}

impl CompositeDispatcher {
    pub fn new(payment_client: Arc<PaymentClient>, producer: Arc<dyn EventProducer>) -> Self {
        Self {
            payment: PaymentDispatcher {
                client: payment_client,
            },
            promotion_reward: KafkaDispatcher {
                producer,
                topic: event_type::PROMOTION_REWARD_CREATED.to_string(),
            },
        }
    }
}

#[async_trait]
impl OutboxDispatcher for CompositeDispatcher {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), DeliveryError> {
        match entry.event_type.as_str() {
            event_type::PAYMENT_REQUIRED => self.payment.deliver(entry).await,
            event_type::PROMOTION_REWARD_CREATED => self.promotion_reward.deliver(entry).await,
            other => Err(DeliveryError::Permanent(format!(
                "no dispatcher registered for event type {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use event_bus::BusError;
    use order_domain::models::{aggregate_type, OutboxStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct MockProducer {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventProducer for MockProducer {
        async fn publish(
            &self,
            topic: &str,
            key: &str,
            _event_id: Uuid,
            _event_type: &str,
            _payload: &serde_json::Value,
        ) -> Result<(), BusError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(topic, event_type::PROMOTION_REWARD_CREATED);
            assert!(!key.is_empty());
            if self.fail {
                Err(BusError::PublishFailed("broker unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn sample_entry(event_type: &str) -> OutboxEntry {
        let now = Utc::now();
        OutboxEntry {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            aggregate_type: aggregate_type::PROMOTION_REWARD.to_string(),
            aggregate_id: Uuid::new_v4(),
            payload: serde_json::json!({"reward_id": Uuid::new_v4(), "order_id": Uuid::new_v4()}),
            status: OutboxStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            processed_at: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_kafka_dispatcher_publishes_under_the_declared_topic() {
        let producer = Arc::new(MockProducer { calls: AtomicUsize::new(0), fail: false });
        let dispatcher = KafkaDispatcher {
            producer: producer.clone(),
            topic: event_type::PROMOTION_REWARD_CREATED.to_string(),
        };
        let entry = sample_entry(event_type::PROMOTION_REWARD_CREATED);

        let result = dispatcher.deliver(&entry).await;

        assert!(result.is_ok());
        assert_eq!(producer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_kafka_dispatcher_surfaces_publish_failure_as_transient() {
        let producer = Arc::new(MockProducer { calls: AtomicUsize::new(0), fail: true });
        let dispatcher = KafkaDispatcher {
            producer,
            topic: event_type::PROMOTION_REWARD_CREATED.to_string(),
        };
        let entry = sample_entry(event_type::PROMOTION_REWARD_CREATED);

        match dispatcher.deliver(&entry).await {
            Err(DeliveryError::Transient(_)) => {}
            other => panic!("expected Transient, got {other:?}"),
        }
    }
}

