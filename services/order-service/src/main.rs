mod handlers;

use actix_web::{middleware, web, App, HttpServer};
use db_pool::{create_pool, DbConfig};
use order_domain::{OrderCommandService, SqlxOrderRepository, SqlxOutboxRepository};
use std::io;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub struct AppState {
    pub orders: OrderCommandService<SqlxOrderRepository, SqlxOutboxRepository>,
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting order-service");

    let db_config = DbConfig::for_service("order-service");
    let pool = create_pool(db_config)
        .await
        .map_err(|e| io::Error::other(format!("failed to connect to database: {e}")))?;

    let orders = SqlxOrderRepository::new(pool.clone());
    let outbox = SqlxOutboxRepository::new(pool.clone());
    let state = Arc::new(AppState {
        orders: OrderCommandService::new(pool, Arc::new(orders), Arc::new(outbox)),
    });

    let bind_addr = std::env::var("ORDER_SERVICE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    tracing::info!(addr = %bind_addr, "listening");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::register_routes)
    })
    .bind(&bind_addr)?
    .run()
    .await
}
