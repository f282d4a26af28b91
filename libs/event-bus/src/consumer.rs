//! Manual-offset-commit consumption, grounded on the notification service's
//! `KafkaNotificationConsumer::start` loop: auto-commit disabled, offsets
//! committed only once the caller's handler has finished successfully. Unlike
//! that consumer this one does not batch — every component that uses it
//! (payment-consumer, promotion-engine) processes one message, with its own
//! downstream side effects, before the next one is read.

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::ClientConfig;
use tracing::warn;

use crate::error::BusError;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub brokers: String,
    pub group_id: String,
    pub topics: Vec<String>,
    pub session_timeout_ms: String,
    pub heartbeat_interval_ms: String,
}

impl ConsumerConfig {
    pub fn new(brokers: impl Into<String>, group_id: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            topics,
            session_timeout_ms: "30000".to_string(),
            heartbeat_interval_ms: "10000".to_string(),
        }
    }
}

pub struct ConsumedMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl ConsumedMessage {
    pub fn payload_str(&self) -> Result<&str, BusError> {
        std::str::from_utf8(&self.payload).map_err(|_| BusError::InvalidUtf8)
    }

    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, BusError> {
        Ok(serde_json::from_str(self.payload_str()?)?)
    }
}

pub struct EventConsumer {
    consumer: StreamConsumer,
}

impl EventConsumer {
    pub fn new(config: &ConsumerConfig) -> Result<Self, BusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", &config.session_timeout_ms)
            .set("heartbeat.interval.ms", &config.heartbeat_interval_ms)
            .create()?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics)?;

        Ok(Self { consumer })
    }

    /// Block until the next message arrives. Does not commit — the caller
    /// must call `commit()` only after its own side effects have succeeded.
    pub async fn recv(&self) -> Result<ConsumedMessage, BusError> {
        let msg = self.consumer.recv().await?;
        let payload = msg.payload().ok_or(BusError::EmptyPayload)?.to_vec();
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        Ok(ConsumedMessage {
            topic: msg.topic().to_string(),
            key,
            payload,
        })
    }

    /// Commit the consumer group's offsets asynchronously. Call this only
    /// after the message just received has been fully and durably handled;
    /// on any handling failure, skip the commit so the broker redelivers.
    pub fn commit(&self) -> Result<(), BusError> {
        if let Err(e) = self.consumer.commit_consumer_state(CommitMode::Async) {
            warn!(error = %e, "failed to commit Kafka offsets");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_config_defaults() {
        let cfg = ConsumerConfig::new("localhost:9092", "payment_group", vec!["payment_authorized".to_string()]);
        assert_eq!(cfg.brokers, "localhost:9092");
        assert_eq!(cfg.group_id, "payment_group");
        assert_eq!(cfg.topics, vec!["payment_authorized".to_string()]);
        assert_eq!(cfg.session_timeout_ms, "30000");
        assert_eq!(cfg.heartbeat_interval_ms, "10000");
    }

    #[test]
    fn test_deserialize_rejects_invalid_json() {
        let msg = ConsumedMessage {
            topic: "payment_authorized".to_string(),
            key: Some("order-1".to_string()),
            payload: b"not json".to_vec(),
        };
        let result: Result<serde_json::Value, BusError> = msg.deserialize();
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_round_trips_valid_payload() {
        #[derive(serde::Deserialize)]
        struct OrderIdEvent {
            order_id: String,
        }

        let msg = ConsumedMessage {
            topic: "promotion_rewards".to_string(),
            key: None,
            payload: br#"{"order_id":"11111111-1111-1111-1111-111111111111"}"#.to_vec(),
        };
        let event: OrderIdEvent = msg.deserialize().unwrap();
        assert_eq!(event.order_id, "11111111-1111-1111-1111-111111111111");
    }

    #[test]
    fn test_payload_str_rejects_invalid_utf8() {
        let msg = ConsumedMessage {
            topic: "t".to_string(),
            key: None,
            payload: vec![0xff, 0xfe, 0xfd],
        };
        assert!(matches!(msg.payload_str(), Err(BusError::InvalidUtf8)));
    }
}
