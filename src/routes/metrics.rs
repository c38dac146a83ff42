use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for every metric the pipeline records.
pub fn describe_metrics() {
    metrics::describe_counter!("missions_queued_total", "Missions accepted at ingress");
    metrics::describe_gauge!("mission_queue_depth", "Missions waiting for a worker");
    metrics::describe_counter!("missions_processed_total", "Missions whose result was pushed by a worker");
    metrics::describe_histogram!("mission_processing_seconds", "Wall time of one mission pipeline run");
    metrics::describe_counter!("pictures_processed_total", "Pictures evaluated, by outcome");
    metrics::describe_histogram!("inference_seconds", "Time spent in one inference call");
    metrics::describe_counter!("results_routed_total", "Results popped by the result router");
    metrics::describe_counter!("callbacks_total", "Callback delivery attempts, by status");
}

/// `/metrics` route bound to the recorder handle.
pub fn metrics_router(handle: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(handle)
}

/// Prometheus text exposition of the installed recorder.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
