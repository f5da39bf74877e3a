//! # imgproxy-relay
//!
//! A verifying relay placed in front of an imgproxy-compatible image
//! processing backend.
//!
//! The relay authenticates inbound requests via a truncated HMAC-SHA256
//! signature embedded in the URL path, rewrites the requested processing
//! directives (merging path- and query-supplied options and a
//! content-negotiated format), re-signs the rewritten request with the
//! same key material, forwards it to the backend and streams the response
//! back unmodified.
//!
//! ## Architecture
//!
//! - [`signing`] - HMAC-SHA256 signature computation, verification and the
//!   URL-safe base64 codec
//! - [`options`] - processing option parsing, merging and format negotiation
//! - [`url_builder`] - deterministic reconstruction of signed backend URLs
//! - [`server`] - Axum server, forwarding pipeline and Prometheus metrics
//! - [`config`] - CLI/environment configuration
//!
//! ## Request Format
//!
//! ```text
//! /{signature}/{directive}*/{encoded-uri}
//! ```
//!
//! where `signature` is URL-safe base64, each `directive` is `key:value`
//! with `key` one of `w`, `h`, `q`, and the final segment is the URL-safe
//! base64 of the source URI. Query parameters `w`, `h` and `q` override
//! their path counterparts; the `Accept` header selects the output format.

pub mod config;
pub mod error;
pub mod options;
pub mod server;
pub mod signing;
pub mod url_builder;

// Re-export commonly used types
pub use config::Config;
pub use error::{SigningError, UrlBuildError};
pub use options::{
    append_format, merge_options, negotiate_format, parse_path_options, QueryOptions,
};
pub use server::{create_router, forward_handler, AppState, HealthResponse, Metrics};
pub use signing::{sign, url_safe_decode, url_safe_encode, verify};
pub use url_builder::generate_url;
