//! Thin Kafka wrapper shared by the services that sit on either side of a
//! topic: producers append to `promotion_rewards` and
//! `promotion.reward.created`; consumers read `payment_authorized` and
//! `promotion_rewards` with manual offset commit, so a crash mid-handler
//! redelivers rather than silently drops.

pub mod consumer;
pub mod error;
pub mod producer;

pub use consumer::{ConsumedMessage, ConsumerConfig, EventConsumer};
pub use error::BusError;
pub use producer::{EventProducer, KafkaEventProducer};

pub mod topics {
    pub const PAYMENT_AUTHORIZED: &str = "payment_authorized";
    pub const PROMOTION_REWARDS: &str = "promotion_rewards";
    pub const PROMOTION_REWARD_CREATED: &str = "promotion.reward.created";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names_match_the_wire_contract() {
        assert_eq!(topics::PAYMENT_AUTHORIZED, "payment_authorized");
        assert_eq!(topics::PROMOTION_REWARDS, "promotion_rewards");
        assert_eq!(topics::PROMOTION_REWARD_CREATED, "promotion.reward.created");
    }
}
