//! Prometheus metrics for the relay.
//!
//! All metrics live in an explicitly constructed [`Metrics`] instance with
//! its own registry, injected into the forwarder via application state.
//! There is no process-wide singleton, so tests can create isolated
//! instances without cross-talk.

use std::time::Instant;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Histogram buckets for request duration, in seconds.
const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// The relay's metrics, registered on a private registry.
pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
    requests_in_progress: IntGaugeVec,
    backend_errors: IntCounterVec,
    signature_errors: IntCounterVec,
}

impl Metrics {
    /// Create and register all metrics under the given namespace.
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "requests_total",
                "Total number of image relay requests processed",
            )
            .namespace(namespace),
            &["status", "path"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "request_duration_seconds",
                "Duration of image relay requests in seconds",
            )
            .namespace(namespace)
            .buckets(DURATION_BUCKETS.to_vec()),
            &["status", "path"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let requests_in_progress = IntGaugeVec::new(
            Opts::new(
                "requests_in_progress",
                "Current number of image relay requests being processed",
            )
            .namespace(namespace),
            &["path"],
        )?;
        registry.register(Box::new(requests_in_progress.clone()))?;

        let backend_errors = IntCounterVec::new(
            Opts::new(
                "backend_errors_total",
                "Total number of backend errors during request forwarding",
            )
            .namespace(namespace),
            &["type"],
        )?;
        registry.register(Box::new(backend_errors.clone()))?;

        let signature_errors = IntCounterVec::new(
            Opts::new(
                "signature_errors_total",
                "Total number of signature validation errors",
            )
            .namespace(namespace),
            &["type"],
        )?;
        registry.register(Box::new(signature_errors.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            requests_in_progress,
            backend_errors,
            signature_errors,
        })
    }

    /// Increment the total requests counter.
    pub fn increment_requests_total(&self, status: &str, path: &str) {
        self.requests_total.with_label_values(&[status, path]).inc();
    }

    /// Record the duration of a request.
    pub fn observe_request_duration(&self, start: Instant, status: &str, path: &str) {
        self.request_duration
            .with_label_values(&[status, path])
            .observe(start.elapsed().as_secs_f64());
    }

    /// Increment the in-progress requests gauge.
    pub fn add_request_in_progress(&self, path: &str) {
        self.requests_in_progress.with_label_values(&[path]).inc();
    }

    /// Decrement the in-progress requests gauge.
    pub fn remove_request_in_progress(&self, path: &str) {
        self.requests_in_progress.with_label_values(&[path]).dec();
    }

    /// Increment the backend error counter.
    pub fn increment_backend_error(&self, error_type: &str) {
        self.backend_errors.with_label_values(&[error_type]).inc();
    }

    /// Increment the signature error counter.
    pub fn increment_signature_error(&self, error_type: &str) {
        self.signature_errors.with_label_values(&[error_type]).inc();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_are_isolated() {
        let a = Metrics::new("relay_test").unwrap();
        let b = Metrics::new("relay_test").unwrap();

        a.increment_requests_total("OK", "/x");

        assert!(a.encode().unwrap().contains("requests_total"));
        assert!(!b.encode().unwrap().contains("/x"));
    }

    #[test]
    fn test_requests_total_labels() {
        let metrics = Metrics::new("relay_test").unwrap();
        metrics.increment_requests_total("Forbidden", "/sig/w:300/abc");

        let text = metrics.encode().unwrap();
        assert!(text.contains("relay_test_requests_total"));
        assert!(text.contains("Forbidden"));
        assert!(text.contains("/sig/w:300/abc"));
    }

    #[test]
    fn test_in_progress_gauge_round_trip() {
        let metrics = Metrics::new("relay_test").unwrap();
        metrics.add_request_in_progress("/p");
        assert!(metrics.encode().unwrap().contains("requests_in_progress{path=\"/p\"} 1"));

        metrics.remove_request_in_progress("/p");
        assert!(metrics.encode().unwrap().contains("requests_in_progress{path=\"/p\"} 0"));
    }

    #[test]
    fn test_error_counters() {
        let metrics = Metrics::new("relay_test").unwrap();
        metrics.increment_signature_error("invalid_signature");
        metrics.increment_backend_error("connection_error");

        let text = metrics.encode().unwrap();
        assert!(text.contains("signature_errors_total{type=\"invalid_signature\"} 1"));
        assert!(text.contains("backend_errors_total{type=\"connection_error\"} 1"));
    }

    #[test]
    fn test_observe_request_duration() {
        let metrics = Metrics::new("relay_test").unwrap();
        metrics.observe_request_duration(Instant::now(), "OK", "/p");

        let text = metrics.encode().unwrap();
        assert!(text.contains("request_duration_seconds_count"));
    }
}
