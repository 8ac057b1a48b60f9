//! # Prometheus Metrics
//!
//! Operational metrics for the escrow node, rendered at `GET /metrics`
//! in the Prometheus text exposition format.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it
/// can be shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of escrow operations accepted and committed.
    pub operations_total: IntCounter,
    /// Total number of escrow operations rejected with an error.
    pub operations_rejected_total: IntCounter,
    /// Number of currently active listings.
    pub active_listings: IntGauge,
    /// Total number of sales finalized.
    pub sales_finalized_total: IntCounter,
    /// Total number of sales cancelled.
    pub sales_cancelled_total: IntCounter,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("deedflow".into()), None)
            .expect("failed to create prometheus registry");

        let operations_total = IntCounter::new(
            "operations_total",
            "Total number of committed escrow operations",
        )
        .expect("metric creation");
        registry
            .register(Box::new(operations_total.clone()))
            .expect("metric registration");

        let operations_rejected_total = IntCounter::new(
            "operations_rejected_total",
            "Total number of escrow operations rejected with an error",
        )
        .expect("metric creation");
        registry
            .register(Box::new(operations_rejected_total.clone()))
            .expect("metric registration");

        let active_listings =
            IntGauge::new("active_listings", "Number of currently active listings")
                .expect("metric creation");
        registry
            .register(Box::new(active_listings.clone()))
            .expect("metric registration");

        let sales_finalized_total =
            IntCounter::new("sales_finalized_total", "Total number of finalized sales")
                .expect("metric creation");
        registry
            .register(Box::new(sales_finalized_total.clone()))
            .expect("metric registration");

        let sales_cancelled_total =
            IntCounter::new("sales_cancelled_total", "Total number of cancelled sales")
                .expect("metric creation");
        registry
            .register(Box::new(sales_cancelled_total.clone()))
            .expect("metric registration");

        Self {
            registry,
            operations_total,
            operations_rejected_total,
            active_listings,
            sales_finalized_total,
            sales_cancelled_total,
        }
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
