//! # idp-crypto
//!
//! Cryptographic primitives for the SAML identity provider, built on aws-lc-rs.
//!
//! ## Provided
//!
//! - Message digests used by XML-DSig (SHA-1 for verification only, SHA-2 family)
//! - RSA PKCS#1 v1.5 signing with the IdP key and verification with SP certificates
//! - PEM/DER loading of private keys and X.509 certificates
//! - Random SAML identifiers and session indexes
//!
//! Key material never appears in `Debug` output or error messages.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod error;
pub mod hash;
pub mod keys;
pub mod random;

pub use algorithm::{HashAlgorithm, SignatureAlgorithm};
pub use error::CryptoError;
pub use hash::{hash, sha1, sha256, sha384, sha512};
pub use keys::{pem_to_der, Certificate, RsaSigningKey};
pub use random::{generate_saml_id, generate_session_index, random_alphanumeric};
