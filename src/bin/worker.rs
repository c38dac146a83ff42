use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use mission_dispatch::{
    config::{AppConfig, InstructionSet},
    routes,
    services::{
        download::DownloadStage,
        inference::{InferenceAdapter, OllamaClient},
        limiter::ConcurrencyLimiter,
        pipeline::MissionPipeline,
        queue::{JobQueue, RedisBroker},
        worker::Worker,
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

    tracing::info!("Starting mission worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let metrics_addr: SocketAddr = config
        .worker_metrics_addr
        .parse()
        .expect("WORKER_METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    routes::metrics::describe_metrics();

    let instructions = Arc::new(InstructionSet::load(
        &config.instructions_path,
        &config.fallback_instruction,
    ));

    // Process-wide resources shared by every worker loop below.
    let download_limiter = Arc::new(ConcurrencyLimiter::new(config.download_permits));
    let accelerator = Arc::new(Mutex::new(()));

    let download = Arc::new(
        DownloadStage::new(
            download_limiter,
            &config.image_dir,
            config.download_accept_invalid_certs,
        )
        .expect("Failed to initialize download stage"),
    );

    let model = OllamaClient::new(&config.ollama_url).expect("Failed to initialize inference client");
    let inference = Arc::new(InferenceAdapter::new(
        Arc::new(model),
        config.ollama_model.clone(),
        accelerator,
    ));

    let pipeline = Arc::new(MissionPipeline::new(download, inference, instructions));

    let broker = RedisBroker::new(&config.redis_url).expect("Failed to initialize Redis broker");
    let queue = Arc::new(JobQueue::new(
        Arc::new(broker),
        config.task_queue.clone(),
        config.result_queue.clone(),
    ));

    let loops = config.worker_concurrency.max(1);
    tracing::info!(
        loops,
        download_permits = config.download_permits,
        model = %config.ollama_model,
        "Worker ready, starting mission loops"
    );

    let handles: Vec<_> = (0..loops)
        .map(|id| tokio::spawn(Worker::new(id, queue.clone(), pipeline.clone()).run()))
        .collect();

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker loop terminated");
        }
    }
}
