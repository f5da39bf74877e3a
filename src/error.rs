use thiserror::Error;

/// Errors that can occur while computing a URL signature.
///
/// The offending key/salt material itself is never included in the error,
/// only the position information reported by the hex decoder.
#[derive(Debug, Clone, Error)]
pub enum SigningError {
    /// The configured HMAC key is not valid hex
    #[error("invalid key hex: {0}")]
    InvalidKeyHex(hex::FromHexError),

    /// The configured salt is not valid hex
    #[error("invalid salt hex: {0}")]
    InvalidSaltHex(hex::FromHexError),
}

/// Errors that can occur while rebuilding the backend URL.
#[derive(Debug, Clone, Error)]
pub enum UrlBuildError {
    /// Signing the rewritten path failed (malformed key/salt)
    #[error("sign error: {0}")]
    Signing(#[from] SigningError),

    /// The configured base URL could not be parsed for joining
    #[error("url join error: {0}")]
    Join(url::ParseError),
}
