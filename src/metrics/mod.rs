//! Prometheus metrics for search traffic, severity lookups and bulk jobs.
//!
//! # Example
//! ```no_run
//! use alert_triage::metrics::{init_metrics, gather_metrics, BULK_ITEMS_TOTAL};
//!
//! init_metrics().expect("metrics registered once");
//! BULK_ITEMS_TOTAL.with_label_values(&["remove_tag", "success"]).inc();
//! println!("{}", gather_metrics());
//! ```

use lazy_static::lazy_static;
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Search Engine Metrics
    // ============================================================================

    /// Requests sent to the search engine
    ///
    /// Labels: operation, outcome
    pub static ref SEARCH_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("search_requests_total", "Total number of search engine requests")
            .namespace("alert_triage"),
        &["operation", "outcome"]
    ).expect("Failed to create SEARCH_REQUESTS_TOTAL metric");

    /// Search engine request duration in seconds
    ///
    /// Labels: operation
    pub static ref SEARCH_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "search_request_duration_seconds",
            "Search engine request duration in seconds"
        )
        .namespace("alert_triage")
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"]
    ).expect("Failed to create SEARCH_REQUEST_DURATION_SECONDS metric");

    /// Failed search engine requests
    ///
    /// Labels: operation, class (unreachable, client, server)
    pub static ref TRANSPORT_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("transport_errors_total", "Total number of failed search engine requests")
            .namespace("alert_triage"),
        &["operation", "class"]
    ).expect("Failed to create TRANSPORT_ERRORS_TOTAL metric");

    // ============================================================================
    // Aggregation Metrics
    // ============================================================================

    /// Severity lookups for aggregation rows
    ///
    /// Labels: result (cached, fetched, not_found, error)
    pub static ref SEVERITY_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("severity_lookups_total", "Total number of severity lookups")
            .namespace("alert_triage"),
        &["result"]
    ).expect("Failed to create SEVERITY_LOOKUPS_TOTAL metric");

    // ============================================================================
    // Bulk Metrics
    // ============================================================================

    /// Documents attempted by bulk mutations
    ///
    /// Labels: action, outcome (success, failure)
    pub static ref BULK_ITEMS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("bulk_items_total", "Total number of documents sent in bulk mutations")
            .namespace("alert_triage"),
        &["action", "outcome"]
    ).expect("Failed to create BULK_ITEMS_TOTAL metric");

    /// Finished bulk jobs
    ///
    /// Labels: outcome (done, failed)
    pub static ref BULK_JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("bulk_jobs_total", "Total number of finished bulk jobs")
            .namespace("alert_triage"),
        &["outcome"]
    ).expect("Failed to create BULK_JOBS_TOTAL metric");
}

/// Register all metrics with the global registry.
///
/// Call once at startup; a second call returns `AlreadyReg`.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_REQUEST_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(TRANSPORT_ERRORS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEVERITY_LOOKUPS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BULK_ITEMS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BULK_JOBS_TOTAL.clone()))?;
    Ok(())
}

/// Render the registry in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        // the registry is global, so a parallel test may already have registered
        let result = init_metrics();
        assert!(result.is_ok() || matches!(result, Err(prometheus::Error::AlreadyReg)));

        BULK_JOBS_TOTAL.with_label_values(&["done"]).inc();
        let output = gather_metrics();
        assert!(output.contains("alert_triage_bulk_jobs_total"));
    }
}
