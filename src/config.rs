//! Configuration management for the imgproxy relay.
//!
//! Configuration is read from command-line arguments via clap, with every
//! option also settable through environment variables. The signing options
//! keep the environment variable names of the imgproxy convention
//! (`IMGPROXY_KEY`, `IMGPROXY_SALT`, ...) so an existing deployment can be
//! pointed at the relay without renaming anything.
//!
//! # Environment Variables
//!
//! - `IMGPROXY_KEY` - hex-encoded HMAC key (required)
//! - `IMGPROXY_SALT` - hex-encoded salt (required)
//! - `IMGPROXY_SIGNATURE_SIZE` - signature length in bytes (default: 32)
//! - `IMGPROXY_BASE_URL` - base URL of the backend (required)
//! - `IMGPROXY_ENCODE` - base64-encode source URIs in rebuilt URLs (default: true)
//! - `IMGPROXY_SECRET` - optional bearer token sent to the backend
//! - `RELAY_HOST` - bind address (default: 0.0.0.0)
//! - `RELAY_PORT` - listen port (default: 8080)
//! - `METRICS_ENABLED` - expose Prometheus metrics at /metrics (default: true)
//! - `BACKEND_TIMEOUT_SECS` - backend request timeout (default: 30)

use clap::Parser;
use url::Url;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default signature length in bytes (the full HMAC-SHA256 digest).
pub const DEFAULT_SIGNATURE_SIZE: i32 = 32;

/// Default backend request timeout in seconds.
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// CLI Arguments
// =============================================================================

/// imgproxy-relay - a verifying, re-signing relay for imgproxy.
///
/// Verifies the HMAC signature of inbound URLs, rewrites the processing
/// options from path, query and Accept header, re-signs the result and
/// forwards the request to the configured backend.
#[derive(Parser, Debug, Clone)]
#[command(name = "imgproxy-relay")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "RELAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "RELAY_PORT")]
    pub port: u16,

    // =========================================================================
    // Signing Configuration
    // =========================================================================
    /// Hex-encoded HMAC key used for verifying and re-signing URLs.
    #[arg(long, env = "IMGPROXY_KEY")]
    pub key: String,

    /// Hex-encoded salt fed to the MAC before the signable path.
    #[arg(long, env = "IMGPROXY_SALT")]
    pub salt: String,

    /// Signature length in bytes (values outside 0-32 keep the full digest).
    #[arg(long, default_value_t = DEFAULT_SIGNATURE_SIZE, env = "IMGPROXY_SIGNATURE_SIZE")]
    pub signature_size: i32,

    // =========================================================================
    // Backend Configuration
    // =========================================================================
    /// Base URL of the imgproxy backend rebuilt URLs are joined against.
    #[arg(long, env = "IMGPROXY_BASE_URL")]
    pub base_url: String,

    /// Base64-encode the source URI in rebuilt URLs.
    ///
    /// When disabled, the source URI is forwarded with a `plain/` prefix.
    #[arg(long, default_value_t = true, env = "IMGPROXY_ENCODE")]
    pub encode: bool,

    /// Bearer token added as `Authorization: Bearer <secret>` on backend requests.
    #[arg(long, env = "IMGPROXY_SECRET")]
    pub secret: Option<String>,

    /// Backend request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_BACKEND_TIMEOUT_SECS, env = "BACKEND_TIMEOUT_SECS")]
    pub backend_timeout: u64,

    // =========================================================================
    // Metrics Configuration
    // =========================================================================
    /// Expose Prometheus metrics at /metrics.
    #[arg(long, default_value_t = true, env = "METRICS_ENABLED")]
    pub metrics_enabled: bool,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    ///
    /// Validation failures are returned to the caller rather than
    /// terminating the process; `main` decides what to do with them.
    pub fn validate(&self) -> Result<(), String> {
        if self.key.is_empty() {
            return Err("HMAC key is required. Set --key or IMGPROXY_KEY".to_string());
        }
        if hex::decode(&self.key).is_err() {
            return Err("HMAC key must be a valid hex string".to_string());
        }

        if self.salt.is_empty() {
            return Err("Salt is required. Set --salt or IMGPROXY_SALT".to_string());
        }
        if hex::decode(&self.salt).is_err() {
            return Err("Salt must be a valid hex string".to_string());
        }

        if self.base_url.is_empty() {
            return Err(
                "Backend base URL is required. Set --base-url or IMGPROXY_BASE_URL".to_string(),
            );
        }
        if Url::parse(&self.base_url).is_err() {
            return Err(format!("Backend base URL is not valid: {}", self.base_url));
        }

        if self.backend_timeout == 0 {
            return Err("backend_timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            key: "0123456789abcdef".to_string(),
            salt: "fedcba9876543210".to_string(),
            signature_size: 32,
            base_url: "http://imgproxy:8081".to_string(),
            encode: true,
            secret: None,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT_SECS,
            metrics_enabled: true,
            verbose: false,
            no_tracing: false,
        }
    }

    #[test]
    fn test_valid_config() {
        let config = test_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_key() {
        let mut config = test_config();
        config.key = String::new();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("IMGPROXY_KEY"));
    }

    #[test]
    fn test_invalid_key_hex() {
        let mut config = test_config();
        config.key = "not-hex".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("hex"));
    }

    #[test]
    fn test_missing_salt() {
        let mut config = test_config();
        config.salt = String::new();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("IMGPROXY_SALT"));
    }

    #[test]
    fn test_invalid_salt_hex() {
        let mut config = test_config();
        config.salt = "ZZ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_base_url() {
        let mut config = test_config();
        config.base_url = String::new();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("IMGPROXY_BASE_URL"));
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = test_config();
        config.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_backend_timeout() {
        let mut config = test_config();
        config.backend_timeout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_address() {
        let config = test_config();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }
}
