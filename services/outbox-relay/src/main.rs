use db_pool::{create_pool, DbConfig};
use order_domain::SqlxOutboxRepository;
use outbox_relay::{CompositeDispatcher, OutboxRelay, RelayConfig};
use rdkafka::config::ClientConfig as KafkaClientConfig;
use rdkafka::producer::FutureProducer;
use std::io;
use std::sync::Arc;
use tokio::sync::watch;
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

    tracing::info!("starting outbox-relay");

    let db_config = DbConfig::for_service("outbox-relay");
    let pool = create_pool(db_config)
        .await
        .map_err(|e| io::Error::other(format!("failed to connect to database: {e}")))?;
    let outbox = Arc::new(SqlxOutboxRepository::new(pool));

    let payment_config = payment_client::PaymentClientConfig::from_env();
    let payment_client = Arc::new(
        payment_client::PaymentClient::connect(&payment_config)
            .await
            .map_err(|e| io::Error::other(format!("failed to connect to payment service: {e}")))?,
    );

    let brokers = std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
    let producer: FutureProducer = KafkaClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("message.timeout.ms", "30000")
        .create()
        .map_err(|e| io::Error::other(format!("failed to create kafka producer: {e}")))?;
    let producer = Arc::new(event_bus::KafkaEventProducer::new(producer));

    let dispatcher = Arc::new(CompositeDispatcher::new(payment_client, producer));
    let config = RelayConfig::from_env();

    let relay = Arc::new(OutboxRelay::new(outbox, dispatcher, config.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_handle = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.run(shutdown_rx).await })
    };

    wait_for_signal().await;
    tracing::info!("shutdown signal received, draining outbox relay");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(config.shutdown_grace, relay_handle).await {
        Ok(Ok(())) => tracing::info!("outbox relay drained cleanly"),
        Ok(Err(e)) => tracing::error!(error = %e, "outbox relay task panicked"),
        Err(_) => tracing::warn!("shutdown grace period elapsed before relay drained"),
    }

    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
