//! Axum-based HTTP server for the relay.
//!
//! - [`forward`] - the request verification/rewrite/forwarding pipeline
//! - [`metrics`] - Prometheus metrics instance and exposition
//! - [`routes`] - router wiring and service endpoints

pub mod forward;
pub mod metrics;
pub mod routes;

pub use forward::{forward_handler, AppState, HttpClient};
pub use metrics::Metrics;
pub use routes::{create_router, health_handler, metrics_handler, HealthResponse};
