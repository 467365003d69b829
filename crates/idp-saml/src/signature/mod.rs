//! XML Signature support for SAML.
//!
//! Enveloped XML-DSig signatures over exclusive-canonicalized elements,
//! plus the detached query-string signatures of the HTTP-Redirect binding.
//!
//! RSA-SHA256 is the default. RSA-SHA1 signatures from service providers
//! are verified only when explicitly allowed, and never produced.

pub mod c14n;
mod signer;
mod validator;

use std::fmt;
use std::path::Path;

pub use idp_crypto::{HashAlgorithm, SignatureAlgorithm};
pub use signer::*;
pub use validator::*;

use idp_crypto::{Certificate, RsaSigningKey};

use crate::error::{SamlError, SamlResult};

/// Parsed `<ds:Signature>` contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlSignature {
    /// The signature algorithm used.
    pub algorithm: SignatureAlgorithm,
    /// The digest algorithm of the single reference.
    pub digest_algorithm: HashAlgorithm,
    /// The reference URI (`#` followed by the signed element's ID).
    pub reference_uri: String,
    /// `InclusiveNamespaces PrefixList` of the reference's C14N transform.
    pub inclusive_prefixes: Vec<String>,
    /// The digest value (base64 encoded).
    pub digest_value: String,
    /// The signature value (base64 encoded).
    pub signature_value: String,
    /// X.509 certificate from `KeyInfo` (base64, DER), if present.
    pub x509_certificate: Option<String>,
}

impl XmlSignature {
    /// Returns the referenced ID without the leading `#`.
    #[must_use]
    pub fn reference_id(&self) -> &str {
        self.reference_uri.trim_start_matches('#')
    }
}

/// Configuration for signature creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureConfig {
    /// The signature algorithm to use.
    pub algorithm: SignatureAlgorithm,
    /// The reference digest algorithm.
    pub digest: HashAlgorithm,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self::with_algorithm(SignatureAlgorithm::RsaSha256)
    }
}

impl SignatureConfig {
    /// Creates a configuration whose digest matches the signature algorithm.
    #[must_use]
    pub const fn with_algorithm(algorithm: SignatureAlgorithm) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(),
        }
    }
}

/// The IdP's private key and certificate.
///
/// Loaded once at startup and shared read-only. `Debug` output never
/// includes key material.
pub struct SigningCredential {
    key: RsaSigningKey,
    certificate: Certificate,
}

impl SigningCredential {
    /// Creates a credential from an already parsed key and certificate.
    #[must_use]
    pub fn new(key: RsaSigningKey, certificate: Certificate) -> Self {
        Self { key, certificate }
    }

    /// Creates a credential from PEM text.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] if either PEM is invalid.
    pub fn from_pem(private_key_pem: &str, certificate_pem: &str) -> SamlResult<Self> {
        let key = RsaSigningKey::from_pem(private_key_pem)
            .map_err(|e| SamlError::ConfigurationError(format!("signing key: {e}")))?;
        let certificate = Certificate::from_pem(certificate_pem)
            .map_err(|e| SamlError::ConfigurationError(format!("signing certificate: {e}")))?;
        Ok(Self::new(key, certificate))
    }

    /// Reads and parses PEM files.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] if a file cannot be read or parsed.
    pub fn from_files(key_path: &Path, cert_path: &Path) -> SamlResult<Self> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                SamlError::ConfigurationError(format!("cannot read {}: {e}", path.display()))
            })
        };
        Self::from_pem(&read(key_path)?, &read(cert_path)?)
    }

    /// Returns the signing key.
    #[must_use]
    pub fn key(&self) -> &RsaSigningKey {
        &self.key
    }

    /// Returns the certificate published in metadata and `KeyInfo`.
    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredential")
            .field("certificate", &self.certificate.subject())
            .finish_non_exhaustive()
    }
}
