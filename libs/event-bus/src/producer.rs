//! Kafka publishing, grounded on `transactional-outbox`'s `KafkaOutboxPublisher`:
//! same header set, same key-as-partition strategy. Unlike that publisher this
//! one takes the topic explicitly rather than deriving it from `event_type`,
//! since this pipeline's three topics (`payment_authorized` is published by an
//! upstream service; `promotion_rewards` and `promotion.reward.created` are
//! published here) don't share a single `<prefix>.<aggregate>.events` naming
//! scheme worth inferring.

use async_trait::async_trait;
use chrono::Utc;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::error::BusError;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Publish `payload` to `topic`, keyed by `key` (the order id, in every
    /// topic this pipeline publishes to, so all events for one order land on
    /// the same partition and are delivered in order).
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        event_id: Uuid,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<(), BusError>;
}

pub struct KafkaEventProducer {
    producer: FutureProducer,
}

impl KafkaEventProducer {
    pub fn new(producer: FutureProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl EventProducer for KafkaEventProducer {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        event_id: Uuid,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<(), BusError> {
        let payload_str = serde_json::to_string(payload)?;
        let event_id_str = event_id.to_string();
        let created_at_str = Utc::now().to_rfc3339();

        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "event_type",
                value: Some(event_type.as_bytes()),
            })
            .insert(Header {
                key: "event_id",
                value: Some(event_id_str.as_bytes()),
            })
            .insert(Header {
                key: "created_at",
                value: Some(created_at_str.as_bytes()),
            });

        let record = FutureRecord::to(topic)
            .key(key)
            .payload(&payload_str)
            .headers(headers);

        self.producer
            .send(record, DELIVERY_TIMEOUT)
            .await
            .map_err(|(err, _)| BusError::PublishFailed(err.to_string()))?;

        info!(event_id = %event_id, event_type, topic, "event published");
        Ok(())
    }
}
