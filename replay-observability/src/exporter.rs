use crate::metrics::MetricsCollector;
use axum::{Router, extract::State, http::header, response::IntoResponse, routing::get};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Render prometheus text exposition format from a registry.
pub fn render_metrics(registry: &prometheus::Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or(());
    String::from_utf8(buffer).unwrap_or_default()
}

async fn scrape(State(metrics): State<Arc<MetricsCollector>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
}

/// Scrape router serving `path`.
pub fn router(path: &str, metrics: Arc<MetricsCollector>) -> Router {
    Router::new().route(path, get(scrape)).with_state(metrics)
}

/// Serve the scrape endpoint on an already bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    path: &str,
    metrics: Arc<MetricsCollector>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, path = %path, "Metrics endpoint listening");
    axum::serve(listener, router(path, metrics))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}
