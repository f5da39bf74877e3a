//! URL signature computation and verification.
//!
//! This module implements the imgproxy URL signing scheme: a truncated
//! HMAC-SHA256 over a salt followed by the signable path, rendered as
//! URL-safe base64 without padding.
//!
//! # Signing Scheme
//!
//! ```text
//! signature = base64url_nopad(HMAC-SHA256(key, salt || content)[..size])
//! ```
//!
//! Key and salt are hex-encoded configuration strings and are decoded on
//! every call; malformed hex surfaces as [`SigningError`]. The truncation
//! size is clamped: anything below zero or above the 32-byte digest length
//! keeps the full digest.
//!
//! # Security Properties
//!
//! - **Path binding**: the signature covers the exact signable path; any
//!   byte difference invalidates verification
//! - **Constant-time comparison**: [`verify`] compares signatures with
//!   `subtle` to avoid a timing side channel
//!
//! # Example
//!
//! ```rust
//! use imgproxy_relay::signing::{sign, verify};
//!
//! let key = "736563726574"; // hex
//! let salt = "73616c74";
//!
//! let signature = sign(key, salt, "/w:300/aGVsbG8", 32).unwrap();
//! assert!(verify(key, salt, "/w:300/aGVsbG8", 32, &signature).unwrap());
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::SigningError;

/// HMAC-SHA256 type alias
type HmacSha256 = Hmac<Sha256>;

/// Length of a full HMAC-SHA256 digest in bytes.
pub const FULL_DIGEST_SIZE: usize = 32;

/// Compute a URL-safe, truncated HMAC-SHA256 signature.
///
/// # Arguments
///
/// * `key_hex` - Hex-encoded HMAC key
/// * `salt_hex` - Hex-encoded salt, fed to the MAC before the content
/// * `content` - The signable path to sign
/// * `size` - Number of digest bytes to keep; values outside `0..=32`
///   keep the full digest
///
/// # Returns
///
/// The URL-safe base64 signature without padding, or a [`SigningError`]
/// if the key or salt is not valid hex.
pub fn sign(
    key_hex: &str,
    salt_hex: &str,
    content: &str,
    size: i32,
) -> Result<String, SigningError> {
    let key = hex::decode(key_hex).map_err(SigningError::InvalidKeyHex)?;
    let salt = hex::decode(salt_hex).map_err(SigningError::InvalidSaltHex)?;

    let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC can take key of any size");
    mac.update(&salt);
    mac.update(content.as_bytes());
    let digest = mac.finalize().into_bytes();

    // Clamp the truncation size to the digest length
    let size = if size < 0 || size as usize > digest.len() {
        digest.len()
    } else {
        size as usize
    };

    Ok(URL_SAFE_NO_PAD.encode(&digest[..size]))
}

/// Verify a candidate signature against a freshly computed one.
///
/// The comparison is constant-time, so verification latency does not
/// leak how many leading bytes of the candidate were correct.
pub fn verify(
    key_hex: &str,
    salt_hex: &str,
    content: &str,
    size: i32,
    candidate: &str,
) -> Result<bool, SigningError> {
    let expected = sign(key_hex, salt_hex, content, size)?;
    Ok(expected.as_bytes().ct_eq(candidate.as_bytes()).into())
}

/// Encode bytes as URL-safe base64 without padding.
pub fn url_safe_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode a URL-safe base64 string without padding.
///
/// Fails on characters outside the URL-safe alphabet or on invalid length.
pub fn url_safe_decode(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(encoded)
}

// =============================================================================
// Tests
// =============================================================================
