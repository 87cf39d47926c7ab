mod config;
mod executor;
mod readiness;
mod workers;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use executor::{NullExecutor, NullWebhookClient};
use readiness::PgReadiness;
use scope::Scope;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run database migrations");

    tracing::info!("database migrations applied");

    let shutdown = CancellationToken::new();
    let scope = Scope::default_scope();
    let lease = Duration::from_secs(config.lease_seconds);
    let executor: Arc<dyn executor::Executor> = Arc::new(NullExecutor);
    let webhook: Arc<dyn executor::WebhookClient> = Arc::new(NullWebhookClient);

    for i in 0..config.worker_count {
        tokio::spawn(workers::async_queue_worker(
            pool.clone(),
            scope.clone(),
            format!("async-worker-{i}"),
            executor.clone(),
            lease,
            shutdown.clone(),
        ));
    }

    tokio::spawn(workers::outbox_relay_worker(
        pool.clone(),
        scope.clone(),
        "outbox-relay-0".to_string(),
        lease,
        shutdown.clone(),
    ));

    tokio::spawn(workers::scheduler_worker(
        pool.clone(),
        Duration::from_secs(10),
        shutdown.clone(),
    ));

    tokio::spawn(workers::event_dispatch_coordinator(
        pool.clone(),
        scope.clone(),
        "event-worker-0".to_string(),
        executor.clone(),
        webhook.clone(),
        lease,
        Duration::from_secs(15),
        shutdown.clone(),
    ));

    let health_app: Router = health::router("queue-core", env!("CARGO_PKG_VERSION"), Arc::new(PgReadiness::new(pool.clone())));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.health_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind health listener");

    tracing::info!(%addr, "queue-core health endpoint listening");

    tokio::select! {
        result = axum::serve(listener, health_app) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "health server exited");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, draining workers");
            shutdown.cancel();
        }
    }
}
