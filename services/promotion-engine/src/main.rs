//! C6: consumes `promotion_rewards`, enforces campaign quotas, persists the
//! reward, and appends a `promotion.reward.created` outbox entry for the
//! relay to publish downstream.

use db_pool::{create_pool, DbConfig};
use event_bus::{topics, ConsumerConfig, EventConsumer};
use order_domain::models::PromotionRewardEvent;
use order_domain::{
    DomainError, PromotionRewardService, RewardOutcome, SqlxOrderRepository,
    SqlxOutboxRepository, SqlxPromotionRepository,
};
use std::io;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting promotion-engine");

    let db_config = DbConfig::for_service("promotion-engine");
    let pool = create_pool(db_config)
        .await
        .map_err(|e| io::Error::other(format!("failed to connect to database: {e}")))?;

    let orders = Arc::new(SqlxOrderRepository::new(pool.clone()));
    let promotions = Arc::new(SqlxPromotionRepository::new(pool.clone()));
    let outbox = Arc::new(SqlxOutboxRepository::new(pool));
    let service = PromotionRewardService::new(orders, promotions, outbox);

    let brokers = std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
    let consumer_config = ConsumerConfig::new(
        brokers,
        "promotion_group",
        vec![topics::PROMOTION_REWARDS.to_string()],
    );
    let consumer = EventConsumer::new(&consumer_config)
        .map_err(|e| io::Error::other(format!("failed to create kafka consumer: {e}")))?;

    loop {
        let msg = match consumer.recv().await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "kafka consumer error, retrying");
                continue;
            }
        };

        let event: PromotionRewardEvent = match msg.deserialize() {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable promotion_rewards message, committing offset");
                let _ = consumer.commit();
                continue;
            }
        };

        match service.handle_reward_request(event.order_id).await {
            Ok(RewardOutcome::Rewarded { reward_id }) => {
                tracing::info!(order_id = %event.order_id, reward_id = %reward_id, "reward granted");
                let _ = consumer.commit();
            }
            Ok(RewardOutcome::Rejected(reason)) => {
                tracing::info!(order_id = %event.order_id, reason = %reason, "reward rejected");
                let _ = consumer.commit();
            }
            Ok(RewardOutcome::NotYetAuthorized) => {
                tracing::debug!(order_id = %event.order_id, "order not yet authorized, skipping");
                let _ = consumer.commit();
            }
            Err(DomainError::Transient(e)) => {
                tracing::warn!(order_id = %event.order_id, error = %e, "transient error, not committing offset");
            }
            Err(e) => {
                tracing::error!(order_id = %event.order_id, error = %e, "unexpected error handling reward request, not committing offset");
            }
        }
    }
}
