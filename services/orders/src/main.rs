use std::sync::Arc;

use anyhow::Context as _;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use shopflow_core::shutdown::cancel_on_signal;
use shopflow_core::tracing::init_tracing;
use shopflow_messaging::amqp::AmqpBroker;
use shopflow_messaging::inbox::DbInboxStore;
use shopflow_messaging::outbox::DbOutboxStore;
use shopflow_messaging::runtime::{MessagingRuntime, Subscription};
use shopflow_messaging::topology::{payment_result_consumer, shop_topology};
use shopflow_orders_migration::Migrator;

use shopflow_orders::config::OrdersConfig;
use shopflow_orders::inbound::PaymentResultHandler;
use shopflow_orders::infra::db::DbOrderRepository;
use shopflow_orders::router::build_router;
use shopflow_orders::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("orders");

    let config = OrdersConfig::from_env().context("load orders config")?;

    let db = Database::connect(&config.database_url)
        .await
        .context("connect to database")?;
    if config.run_migrations {
        Migrator::up(&db, None).await.context("run migrations")?;
    }

    let shutdown = CancellationToken::new();
    let handler = PaymentResultHandler::new(DbOrderRepository { db: db.clone() });
    let messaging = MessagingRuntime::start(
        Arc::new(AmqpBroker),
        &config.messaging,
        &shop_topology(),
        Arc::new(DbOutboxStore::new(db.clone())),
        Arc::new(DbInboxStore::new(db.clone())),
        Subscription {
            consumer: payment_result_consumer(config.messaging.prefetch_count),
            handler: Arc::new(handler),
        },
        &shutdown,
    )
    .await
    .context("start messaging")?;

    let state = AppState {
        db,
        registry: messaging.registry(),
    };
    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.orders_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    info!("orders service listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(cancel_on_signal(shutdown.clone()))
        .await
        .context("http server")?;

    messaging.close().await.context("close messaging")?;
    Ok(())
}
