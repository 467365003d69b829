//! Error type for cryptographic operations.

use thiserror::Error;

/// Error type for key loading, signing and verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid or unreadable private key.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Invalid or unreadable certificate.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// PEM armor could not be decoded.
    #[error("invalid PEM: {0}")]
    Pem(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Verification failed.
    #[error("signature verification failed")]
    Verification,

    /// Algorithm not supported for the requested operation.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_error_is_generic() {
        let error = CryptoError::Verification;
        // Don't leak information about why verification failed
        assert_eq!(error.to_string(), "signature verification failed");
    }

    #[test]
    fn invalid_key_carries_reason() {
        let error = CryptoError::InvalidKey("truncated".to_string());
        assert_eq!(error.to_string(), "invalid key format: truncated");
    }
}
