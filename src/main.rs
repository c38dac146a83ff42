use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use mission_dispatch::{
    app_state::AppState,
    config::AppConfig,
    db::{self, MissionStore, PgMissionStore},
    routes,
    services::{
        callback::CallbackForwarder,
        limiter::ConcurrencyLimiter,
        queue::{JobQueue, RedisBroker},
        router::ResultRouter,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing dispatch server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    tracing::info!("Connecting to PostgreSQL database");
    let database_url = config.database_url().expect("DATABASE_URL is required");
    let db_pool = db::init_pool(database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let store: Arc<dyn MissionStore> = Arc::new(PgMissionStore::new(db_pool));

    tracing::info!("Connecting to Redis queues");
    let broker = RedisBroker::new(&config.redis_url).expect("Failed to initialize Redis broker");
    let queue = Arc::new(JobQueue::new(
        Arc::new(broker),
        config.task_queue.clone(),
        config.result_queue.clone(),
    ));

    let callback_limiter = Arc::new(ConcurrencyLimiter::new(config.callback_permits));
    let forwarder = Arc::new(
        CallbackForwarder::new(callback_limiter, store.clone())
            .expect("Failed to build callback HTTP client"),
    );

    tokio::spawn(ResultRouter::new(queue.clone(), store.clone(), forwarder).run());

    let state = AppState::new(store, queue);

    let app = routes::api_router(state)
        .merge(routes::metrics::metrics_router(prometheus_handle))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Dispatch server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
