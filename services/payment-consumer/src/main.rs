//! C5: consumes `payment_authorized`, updates order status, and emits the
//! promotion trigger. Grounded on `kafka_consumer.rs`'s commit-after-success
//! loop, simplified to one message at a time (this pipeline has no batching
//! requirement for this consumer — each message's side effects are cheap and
//! must be ordered with respect to that message's own commit).

use db_pool::{create_pool, DbConfig};
use event_bus::{topics, ConsumerConfig, EventConsumer, EventProducer, KafkaEventProducer};
use order_domain::models::{order_status, PaymentAuthorizedEvent, PaymentStatus, PromotionRewardEvent};
use order_domain::{OrderRepository, SqlxOrderRepository};
use rdkafka::config::ClientConfig as KafkaClientConfig;
use rdkafka::producer::FutureProducer;
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting payment-consumer");

    let db_config = DbConfig::for_service("payment-consumer");
    let pool = create_pool(db_config)
        .await
        .map_err(|e| io::Error::other(format!("failed to connect to database: {e}")))?;
    let orders = SqlxOrderRepository::new(pool);

    let brokers = std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
    let producer: FutureProducer = KafkaClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("message.timeout.ms", "30000")
        .create()
        .map_err(|e| io::Error::other(format!("failed to create kafka producer: {e}")))?;
    let producer = KafkaEventProducer::new(producer);

    let consumer_config = ConsumerConfig::new(
        brokers,
        "payment_group",
        vec![topics::PAYMENT_AUTHORIZED.to_string()],
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

        let event: PaymentAuthorizedEvent = match msg.deserialize() {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable payment_authorized message, committing offset");
                let _ = consumer.commit();
                continue;
            }
        };

        if event.status != PaymentStatus::Authorized {
            tracing::info!(order_id = %event.order_id, status = ?event.status, "payment not authorized, skipping");
            let _ = consumer.commit();
            continue;
        }

        match handle_authorized(&orders, &producer, event.order_id).await {
            Ok(()) => {
                if let Err(e) = consumer.commit() {
                    tracing::warn!(error = %e, "failed to commit offset after successful handling");
                }
            }
            Err(e) => {
                // Don't commit — the message is redelivered and step 1 is
                // idempotent, step 2's downstream is deduplicated by order id.
                tracing::error!(order_id = %event.order_id, error = %e, "failed to process payment_authorized, not committing offset");
            }
        }
    }
}

async fn handle_authorized(
    orders: &SqlxOrderRepository,
    producer: &KafkaEventProducer,
    order_id: Uuid,
) -> Result<(), Box<dyn std::error::Error>> {
    orders.update_status(order_id, order_status::AUTHORIZED).await?;

    let event = PromotionRewardEvent { order_id };
    let payload = serde_json::to_value(&event)?;
    producer
        .publish(
            topics::PROMOTION_REWARDS,
            &order_id.to_string(),
            Uuid::new_v4(),
            "promotion_rewards",
            &payload,
        )
        .await?;

    Ok(())
}
