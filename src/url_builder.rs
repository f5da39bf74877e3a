//! Backend URL construction.
//!
//! Rebuilds a fully signed backend URL from a target URI and a merged
//! option string. The signable path is reconstructed deterministically:
//!
//! ```text
//! /{options}/{encoded-or-plain-uri}        (options non-empty)
//! /{encoded-or-plain-uri}                  (options empty)
//! ```
//!
//! and the final URL is `{base_url}/{signature}{signable_path}`.

use url::Url;

use crate::config::Config;
use crate::error::UrlBuildError;
use crate::signing;

/// Build a signed backend URL for the given target URI and options.
///
/// The target URI is URL-safe base64 encoded when `config.encode` is set,
/// otherwise forwarded literally behind a `plain/` prefix. The rewritten
/// path is signed with the configured key, salt and signature size.
///
/// # Errors
///
/// [`UrlBuildError::Signing`] when the configured key or salt is malformed
/// hex, [`UrlBuildError::Join`] when the base URL does not parse.
pub fn generate_url(
    target_uri: &str,
    options: &str,
    config: &Config,
) -> Result<String, UrlBuildError> {
    // Validate the base URL up front so joining cannot produce garbage
    Url::parse(&config.base_url).map_err(UrlBuildError::Join)?;

    let target = if config.encode {
        signing::url_safe_encode(target_uri.as_bytes())
    } else {
        format!("plain/{}", target_uri)
    };

    let signable_path = if options.is_empty() {
        format!("/{}", target)
    } else {
        format!("/{}/{}", options, target)
    };

    let signature = signing::sign(
        &config.key,
        &config.salt,
        &signable_path,
        config.signature_size,
    )?;

    Ok(format!(
        "{}/{}{}",
        config.base_url.trim_end_matches('/'),
        signature,
        signable_path
    ))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BACKEND_TIMEOUT_SECS;
    use crate::error::SigningError;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
    const TEST_SALT: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            key: TEST_KEY.to_string(),
            salt: TEST_SALT.to_string(),
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
    fn test_generate_url_encoded_target() {
        let config = test_config();
        let url = generate_url("https://example.com/a.jpg", "w:300/q:75", &config).unwrap();

        let encoded = signing::url_safe_encode(b"https://example.com/a.jpg");
        let signable = format!("/w:300/q:75/{}", encoded);
        let signature = signing::sign(TEST_KEY, TEST_SALT, &signable, 32).unwrap();

        assert_eq!(
            url,
            format!("http://imgproxy:8081/{}{}", signature, signable)
        );
    }

    #[test]
    fn test_generate_url_plain_target() {
        let mut config = test_config();
        config.encode = false;

        let url = generate_url("https://example.com/a.jpg", "w:300", &config).unwrap();
        let signable = "/w:300/plain/https://example.com/a.jpg";
        let signature = signing::sign(TEST_KEY, TEST_SALT, signable, 32).unwrap();

        assert_eq!(
            url,
            format!("http://imgproxy:8081/{}{}", signature, signable)
        );
    }

    #[test]
    fn test_generate_url_empty_options() {
        let config = test_config();
        let url = generate_url("https://example.com/a.jpg", "", &config).unwrap();

        let encoded = signing::url_safe_encode(b"https://example.com/a.jpg");
        assert!(url.contains(&format!("/{}", encoded)));
        // No double slash between signature and target
        assert!(!url.contains(&format!("//{}", encoded)));
    }

    #[test]
    fn test_generate_url_trims_trailing_slash_on_base() {
        let mut config = test_config();
        config.base_url = "http://imgproxy:8081/".to_string();

        let url = generate_url("https://example.com/a.jpg", "w:300", &config).unwrap();
        assert!(url.starts_with("http://imgproxy:8081/"));
        assert!(!url.starts_with("http://imgproxy:8081//"));
    }

    #[test]
    fn test_generate_url_signature_verifies() {
        let config = test_config();
        let url = generate_url("https://example.com/a.jpg", "w:300", &config).unwrap();

        let path = url.strip_prefix("http://imgproxy:8081/").unwrap();
        let (signature, rest) = path.split_once('/').unwrap();
        let signable = format!("/{}", rest);

        assert!(signing::verify(TEST_KEY, TEST_SALT, &signable, 32, signature).unwrap());
    }

    #[test]
    fn test_generate_url_invalid_base_url() {
        let mut config = test_config();
        config.base_url = "not a url".to_string();

        let result = generate_url("https://example.com/a.jpg", "", &config);
        assert!(matches!(result, Err(UrlBuildError::Join(_))));
    }

    #[test]
    fn test_generate_url_invalid_key() {
        let mut config = test_config();
        config.key = "ZZ".to_string();

        let result = generate_url("https://example.com/a.jpg", "", &config);
        assert!(matches!(
            result,
            Err(UrlBuildError::Signing(SigningError::InvalidKeyHex(_)))
        ));
    }
}
