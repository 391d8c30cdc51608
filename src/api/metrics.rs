//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Middleware for tracking HTTP request counts and durations
//! - Helper functions the order workflow calls to record business events

use anyhow::Context;
use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::db::AdjustmentReason;
use crate::AppState;

// Metric names as constants for consistency
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const ORDERS_PLACED_TOTAL: &str = "dealdrop_orders_placed_total";
pub const ORDERS_FAILED_TOTAL: &str = "dealdrop_orders_failed_total";
pub const ORDERS_CANCELLED_TOTAL: &str = "dealdrop_orders_cancelled_total";
pub const INVENTORY_ADJUSTMENTS_TOTAL: &str = "dealdrop_inventory_adjustments_total";
pub const CHECKOUTS_ABORTED: &str = "dealdrop_checkouts_aborted";
pub const PRODUCTS_LOW_STOCK: &str = "dealdrop_products_low_stock";

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// This should be called once during application startup.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests received"
    );
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(ORDERS_PLACED_TOTAL, "Orders created from a cart");
    describe_counter!(
        ORDERS_FAILED_TOTAL,
        "Order placements aborted before the order was written"
    );
    describe_counter!(ORDERS_CANCELLED_TOTAL, "Orders cancelled by their owner");
    describe_counter!(
        INVENTORY_ADJUSTMENTS_TOTAL,
        "Stock adjustments by reason (sale/cancellation/restock/compensation)"
    );
    describe_gauge!(
        CHECKOUTS_ABORTED,
        "Aborted checkouts still holding stock decrements"
    );
    describe_gauge!(PRODUCTS_LOW_STOCK, "Active products at or below the low stock threshold");

    Ok(handle)
}

/// GET /metrics - Returns Prometheus-formatted metrics.
///
/// This endpoint is accessible without authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Refresh gauges that are read from the database rather than counted.
async fn update_gauge_metrics(state: &AppState) {
    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM checkouts WHERE status = 'aborted'")
            .fetch_one(&state.db)
            .await
    {
        gauge!(CHECKOUTS_ABORTED).set(count as f64);
    }

    if let Ok(count) = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM products WHERE status = 'active' AND quantity <= ?",
    )
    .bind(state.config.checkout.low_stock_threshold)
    .fetch_one(&state.db)
    .await
    {
        gauge!(PRODUCTS_LOW_STOCK).set(count as f64);
    }
}

/// Middleware to track HTTP request metrics.
///
/// Records:
/// - `http_requests_total` counter with method, path, and status labels
/// - `http_request_duration_seconds` histogram with method and path labels
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Matched route template keeps label cardinality bounded (/api/orders/:id)
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_order_placed() {
    counter!(ORDERS_PLACED_TOTAL).increment(1);
}

pub fn record_order_failed() {
    counter!(ORDERS_FAILED_TOTAL).increment(1);
}

pub fn record_order_cancelled() {
    counter!(ORDERS_CANCELLED_TOTAL).increment(1);
}

pub fn record_inventory_adjustment(reason: AdjustmentReason) {
    counter!(INVENTORY_ADJUSTMENTS_TOTAL, "reason" => reason.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        // Prometheus naming conventions
        for name in [
            HTTP_REQUESTS_TOTAL,
            ORDERS_PLACED_TOTAL,
            ORDERS_FAILED_TOTAL,
            ORDERS_CANCELLED_TOTAL,
            INVENTORY_ADJUSTMENTS_TOTAL,
        ] {
            assert!(name.ends_with("_total"), "{} should end with _total", name);
        }
        assert!(HTTP_REQUEST_DURATION_SECONDS.ends_with("_seconds"));
    }

    #[test]
    fn test_business_counters_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_order_placed();
            record_order_cancelled();
            record_inventory_adjustment(AdjustmentReason::Sale);
        });

        let rendered = handle.render();
        assert!(rendered.contains(ORDERS_PLACED_TOTAL));
        assert!(rendered.contains(ORDERS_CANCELLED_TOTAL));
        assert!(rendered.contains("reason=\"sale\""));
    }
}
