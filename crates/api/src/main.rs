//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::routes::{AppState, SharedStore};
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Connects to PostgreSQL when `DATABASE_URL` is set, otherwise starts an
/// in-memory store seeded with demo data.
async fn open_store(config: &Config) -> (SharedStore, &'static str) {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            (Arc::new(store), "postgres")
        }
        None => {
            let store = InMemoryStore::new();
            let demo = api::seed::seed_demo_data(&store)
                .await
                .expect("failed to seed demo data");
            tracing::info!(user_id = %demo.account.id, "using in-memory store with demo data");
            for product in &demo.products {
                tracing::info!(
                    product_id = %product.id,
                    name = %product.name,
                    price = %product.price,
                    stock = product.stock,
                    "demo product"
                );
            }
            (Arc::new(store), "memory")
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open the store and pick the gateway
    let (store, backend) = open_store(&config).await;
    let gateway = api::build_gateway(&config.gateway);
    tracing::info!(mode = ?config.gateway.mode, "payment gateway configured");

    // 4. Build the application
    let state = Arc::new(AppState::new(store, gateway, backend));
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
