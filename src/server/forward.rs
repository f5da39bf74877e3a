//! The request forwarding pipeline.
//!
//! Every inbound request passes through a single-pass pipeline: verify the
//! URL signature, rewrite the processing options, rebuild and re-sign the
//! backend URL, forward, and stream the backend response back. Each stage
//! is a possible terminal exit with its own HTTP status:
//!
//! | stage                | failure                      | status |
//! |----------------------|------------------------------|--------|
//! | path split           | fewer than 3 segments        | 400    |
//! | signature check      | malformed key/salt hex       | 500    |
//! | signature check      | signature mismatch           | 403    |
//! | target URI decode    | invalid base64 / UTF-8       | 400    |
//! | URL rebuild          | signing or join failure      | 500    |
//! | backend request      | construction failure         | 500    |
//! | backend request      | transport failure or timeout | 502    |
//!
//! Nothing is retried; on success the backend status, headers and body are
//! relayed verbatim. A failure while streaming the body is logged and
//! counted but cannot change the already-sent status line.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{OriginalUri, State};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::options::{self, QueryOptions};
use crate::signing;
use crate::url_builder;

use super::metrics::Metrics;

/// HTTP client used for backend requests.
pub type HttpClient = Client<HttpConnector, Body>;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state passed to all handlers.
///
/// Holds only effectively-immutable configuration, the internally
/// synchronized metrics instance and a cloneable client; the pipeline
/// itself keeps no per-request shared state.
#[derive(Clone)]
pub struct AppState {
    /// Relay configuration, read-only after startup
    pub config: Arc<Config>,

    /// Metrics sink
    pub metrics: Arc<Metrics>,

    /// Client for backend requests
    pub client: HttpClient,
}

impl AppState {
    /// Create application state with a fresh backend client.
    pub fn new(config: Config, metrics: Metrics) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            config: Arc::new(config),
            metrics: Arc::new(metrics),
            client,
        }
    }
}

// =============================================================================
// In-Progress Tracking
// =============================================================================

/// Decrements the in-progress gauge on drop, covering every pipeline exit.
struct InProgressGuard {
    metrics: Arc<Metrics>,
    path: String,
}

impl InProgressGuard {
    fn new(metrics: Arc<Metrics>, path: &str) -> Self {
        metrics.add_request_in_progress(path);
        Self {
            metrics,
            path: path.to_string(),
        }
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.metrics.remove_request_in_progress(&self.path);
    }
}

// =============================================================================
// Forward Handler
// =============================================================================

/// Handle an inbound relay request.
///
/// Expects paths of the form `/{signature}/{options}/{encoded-uri}` where
/// the signature covers everything after its own segment.
pub async fn forward_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();
    // The path is verified as transmitted, without percent-decoding; the
    // signable alphabet (base64url segments and key:value directives)
    // never requires percent-encoding
    let path = uri.path().to_string();
    let config = &state.config;

    let _in_progress = InProgressGuard::new(Arc::clone(&state.metrics), &path);

    debug!(
        method = %method,
        path = %path,
        client_ip = client_ip(&headers).as_deref().unwrap_or("unknown"),
        "received request"
    );

    // Stage 1: split the path into [ "", signature, segments... ]
    let pieces: Vec<&str> = path.split('/').collect();
    if pieces.len() < 3 {
        warn!(path = %path, "invalid URL format");
        return terminal(
            &state,
            start,
            StatusCode::BAD_REQUEST,
            &path,
            "Invalid URL format",
        );
    }

    // Stage 2: verify the signature over everything after its segment
    let provided_signature = pieces[1];
    let signable_path = format!("/{}", pieces[2..].join("/"));

    let signature_valid = match signing::verify(
        &config.key,
        &config.salt,
        &signable_path,
        config.signature_size,
        provided_signature,
    ) {
        Ok(valid) => valid,
        Err(err) => {
            error!(error = %err, "error verifying signature");
            state.metrics.increment_signature_error("invalid_key_salt");
            return terminal(
                &state,
                start,
                StatusCode::INTERNAL_SERVER_ERROR,
                &path,
                "Error verifying signature",
            );
        }
    };

    if !signature_valid {
        warn!(path = %path, "invalid signature");
        state.metrics.increment_signature_error("invalid_signature");
        return terminal(
            &state,
            start,
            StatusCode::FORBIDDEN,
            &path,
            "Invalid signature",
        );
    }

    // Stage 3: merge path options, query options and negotiated format
    let path_options = options::parse_path_options(&pieces[2..]);
    let query_options = QueryOptions::from_query(uri.query().unwrap_or(""));
    let merged = options::merge_options(&path_options, query_options);

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let merged = options::append_format(&merged, accept);

    // Stage 4: decode the target URI and rebuild the backend URL
    let encoded_target = pieces[pieces.len() - 1];
    let target_uri = match signing::url_safe_decode(encoded_target)
        .map_err(|err| err.to_string())
        .and_then(|bytes| String::from_utf8(bytes).map_err(|err| err.to_string()))
    {
        Ok(uri) => uri,
        Err(err) => {
            warn!(path = %path, error = %err, "error decoding target URI");
            return terminal(
                &state,
                start,
                StatusCode::BAD_REQUEST,
                &path,
                "Error decoding URL",
            );
        }
    };

    let backend_url = match url_builder::generate_url(&target_uri, &merged, config) {
        Ok(url) => url,
        Err(err) => {
            error!(error = %err, "error generating backend URL");
            return terminal(
                &state,
                start,
                StatusCode::INTERNAL_SERVER_ERROR,
                &path,
                "Error generating URL",
            );
        }
    };

    debug!(backend_url = %backend_url, "forwarding request to backend");

    // Stage 5: issue the backend request with copied headers
    let mut builder = Request::builder().method(Method::GET).uri(&backend_url);
    for (name, value) in headers.iter() {
        // The client derives Host from the backend URI; the bearer token,
        // when configured, replaces any inbound Authorization header
        if *name == header::HOST {
            continue;
        }
        if config.secret.is_some() && *name == header::AUTHORIZATION {
            continue;
        }
        builder = builder.header(name, value);
    }
    if let Some(ref secret) = config.secret {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", secret));
    }

    let backend_request = match builder.body(Body::empty()) {
        Ok(request) => request,
        Err(err) => {
            error!(error = %err, "error creating backend request");
            state.metrics.increment_backend_error("request_creation_error");
            return terminal(
                &state,
                start,
                StatusCode::INTERNAL_SERVER_ERROR,
                &path,
                "Error creating request",
            );
        }
    };

    let timeout = Duration::from_secs(config.backend_timeout);
    let backend_response = match tokio::time::timeout(
        timeout,
        state.client.request(backend_request),
    )
    .await
    {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            error!(error = %err, "error fetching image from backend");
            state.metrics.increment_backend_error("connection_error");
            return terminal(
                &state,
                start,
                StatusCode::BAD_GATEWAY,
                &path,
                "Error fetching image",
            );
        }
        Err(_) => {
            error!(
                timeout_secs = config.backend_timeout,
                "backend request timed out"
            );
            state.metrics.increment_backend_error("timeout");
            return terminal(
                &state,
                start,
                StatusCode::BAD_GATEWAY,
                &path,
                "Backend timeout",
            );
        }
    };

    // Stage 6/7: relay status, headers and body; record final metrics with
    // the backend's actual status
    let status = backend_response.status();
    let label = status_label(status);
    state.metrics.increment_requests_total(label, &path);
    state.metrics.observe_request_duration(start, label, &path);
    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );

    let (parts, body) = backend_response.into_parts();
    let body = relay_body(Body::new(body), Arc::clone(&state.metrics), path);

    Response::from_parts(parts, body)
}

/// Wrap a backend body so stream failures are logged and counted.
///
/// A failure here surfaces to the client as a truncated body; the status
/// line is already gone, so nothing else can be done with it.
fn relay_body(body: Body, metrics: Arc<Metrics>, path: String) -> Body {
    Body::new(body.map_err(move |err| {
        error!(path = %path, error = %err, "error streaming response body");
        metrics.increment_backend_error("response_copy_error");
        err
    }))
}

/// Best-effort client IP for request logs, taken from the usual proxy
/// headers in precedence order.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    for name in ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"] {
        if let Some(value) = headers.get(name).and_then(|value| value.to_str().ok()) {
            // X-Forwarded-For carries a chain; the first entry is the client
            let ip = value.split(',').next().unwrap_or(value).trim();
            if ip.parse::<std::net::IpAddr>().is_ok() {
                return Some(ip.to_string());
            }
        }
    }
    None
}

/// Record terminal metrics for a failed request and build its response.
fn terminal(
    state: &AppState,
    start: Instant,
    status: StatusCode,
    path: &str,
    message: &'static str,
) -> Response {
    let label = status_label(status);
    state.metrics.increment_requests_total(label, path);
    state.metrics.observe_request_duration(start, label, path);
    (status, message).into_response()
}

/// Canonical reason phrase used as the status metric label.
fn status_label(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_label_canonical_reasons() {
        assert_eq!(status_label(StatusCode::OK), "OK");
        assert_eq!(status_label(StatusCode::BAD_REQUEST), "Bad Request");
        assert_eq!(status_label(StatusCode::FORBIDDEN), "Forbidden");
        assert_eq!(status_label(StatusCode::BAD_GATEWAY), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_relay_body_counts_stream_failures() {
        let metrics = Arc::new(Metrics::new("relay_body_test").unwrap());

        let stream = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(b"partial chunk".to_vec()),
            Err(std::io::Error::other("connection reset by peer")),
        ]);
        let body = relay_body(
            Body::from_stream(stream),
            Arc::clone(&metrics),
            "/p".to_string(),
        );

        assert!(body.collect().await.is_err());
        assert!(metrics
            .encode()
            .unwrap()
            .contains("backend_errors_total{type=\"response_copy_error\"} 1"));
    }

    #[test]
    fn test_client_ip_header_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);

        headers.insert("x-real-ip", "10.0.0.3".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.3"));

        headers.insert(
            "x-forwarded-for",
            "203.0.113.7, 10.0.0.2".parse().unwrap(),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));

        headers.insert("cf-connecting-ip", "198.51.100.4".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn test_client_ip_rejects_non_ip_values() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "not-an-address".parse().unwrap());
        assert_eq!(client_ip(&headers), None);
    }

    #[test]
    fn test_in_progress_guard_decrements_on_drop() {
        let metrics = Arc::new(Metrics::new("relay_guard_test").unwrap());

        {
            let _guard = InProgressGuard::new(Arc::clone(&metrics), "/p");
            assert!(metrics
                .encode()
                .unwrap()
                .contains("requests_in_progress{path=\"/p\"} 1"));
        }

        assert!(metrics
            .encode()
            .unwrap()
            .contains("requests_in_progress{path=\"/p\"} 0"));
    }
}
