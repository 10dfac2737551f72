use crate::catalog_store::{CatalogCounts, EntityKind};
use crate::sync::Outcome;
use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all catalog sync metrics
const PREFIX: &str = "catalog_sync";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Sync Metrics
    pub static ref SYNC_ENTITIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_sync_entities_total"), "Entities seen by reconcile walks"),
        &["kind", "outcome"]
    ).expect("Failed to create sync_entities_total metric");

    pub static ref SYNC_OPERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_sync_operations_total"), "Reconcile and refresh operations"),
        &["operation", "status"]
    ).expect("Failed to create sync_operations_total metric");

    pub static ref SYNC_OPERATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_sync_operation_duration_seconds"),
            "Reconcile and refresh duration in seconds"
        )
        .buckets(vec![0.1, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["operation"]
    ).expect("Failed to create sync_operation_duration_seconds metric");

    pub static ref REFRESH_ENTITIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_refresh_entities_total"), "Entities visited by refresh passes"),
        &["kind", "status"]
    ).expect("Failed to create refresh_entities_total metric");

    // Catalog Metrics
    pub static ref CATALOG_ITEMS_TOTAL: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_items_total"), "Total items in catalog"),
        &["type"]
    ).expect("Failed to create catalog_items_total metric");

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job executions"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job duration in seconds"
        )
        .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "Whether a background job is running"),
        &["job_id"]
    ).expect("Failed to create background_job_running metric");

    // Error Metrics
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "Total errors by type and endpoint"),
        &["error_type", "endpoint"]
    ).expect("Failed to create errors_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");

    pub static ref CATALOG_API_TOKEN_REFRESHES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_catalog_api_token_refreshes_total"),
        "Access tokens acquired from the catalog API"
    ).expect("Failed to create catalog_api_token_refreshes_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_ENTITIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_OPERATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_OPERATION_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(REFRESH_ENTITIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ITEMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_API_TOKEN_REFRESHES_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Set the catalog size gauges
pub fn record_catalog_counts(counts: &CatalogCounts) {
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["artist"])
        .set(counts.artists as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["album"])
        .set(counts.albums as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["track"])
        .set(counts.tracks as f64);
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_sync_entity(kind: EntityKind, outcome: Outcome) {
    SYNC_ENTITIES_TOTAL
        .with_label_values(&[kind.as_str(), outcome.as_str()])
        .inc();
}

/// Record a finished reconcile or refresh operation
pub fn record_sync_operation(operation: &str, success: bool, duration: Duration) {
    let status = if success { "success" } else { "failed" };
    SYNC_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
    SYNC_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

pub fn record_refresh_entity(kind: EntityKind, refreshed: bool) {
    let status = if refreshed { "refreshed" } else { "failed" };
    REFRESH_ENTITIES_TOTAL
        .with_label_values(&[kind.as_str(), status])
        .inc();
}

pub fn record_token_refresh() {
    CATALOG_API_TOKEN_REFRESHES_TOTAL.inc();
}

/// Record a background job execution
pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

/// Record an error
pub fn record_error(error_type: &str, endpoint: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, endpoint])
        .inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok());
            if let Some(kb) = rss_kb {
                PROCESS_MEMORY_BYTES.set(kb * 1024.0);
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_metric(name: &str) -> bool {
        let full_name = format!("{PREFIX}_{name}");
        REGISTRY.gather().iter().any(|m| m.get_name() == full_name)
    }

    #[test]
    fn test_metrics_initialization() {
        init_metrics();
        assert!(!REGISTRY.gather().is_empty(), "Metrics should be registered");
    }

    #[test]
    fn test_record_http_request() {
        init_metrics();
        record_http_request("GET", "/v1/artists/{id}", 200, Duration::from_millis(50));
        assert!(has_metric("http_requests_total"));
    }

    #[test]
    fn test_sync_metrics() {
        init_metrics();
        record_sync_entity(EntityKind::Album, Outcome::Created);
        record_refresh_entity(EntityKind::Artist, false);
        record_sync_operation("reconcile", true, Duration::from_secs(3));

        assert!(has_metric("sync_entities_total"));
        assert!(has_metric("refresh_entities_total"));
        assert!(has_metric("sync_operations_total"));
        let created = SYNC_ENTITIES_TOTAL
            .with_label_values(&["album", "created"])
            .get();
        assert!(created >= 1.0);
    }

    #[test]
    fn test_catalog_metrics() {
        init_metrics();
        record_catalog_counts(&CatalogCounts {
            artists: 100,
            albums: 500,
            tracks: 2000,
        });
        assert!(has_metric("catalog_items_total"));
    }
}
