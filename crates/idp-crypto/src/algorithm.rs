//! Digest and signature algorithm definitions.
//!
//! Each algorithm carries its XML-DSig identifier so the SAML layer can
//! round-trip `Algorithm="..."` attributes and `SigAlg` query parameters.
//!
//! SHA-1 is kept for verifying signatures from legacy service providers
//! only; it is never used to produce a signature.

use serde::{Deserialize, Serialize};

/// Digest algorithms accepted in `<ds:DigestMethod>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-1 (legacy, verification only).
    #[serde(rename = "sha1")]
    Sha1,

    /// SHA-256.
    #[serde(rename = "sha256")]
    Sha256,

    /// SHA-384.
    #[serde(rename = "sha384")]
    Sha384,

    /// SHA-512.
    #[serde(rename = "sha512")]
    Sha512,
}

impl HashAlgorithm {
    /// Returns the output length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Returns the algorithm name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Returns the XML-DSig digest method URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Parses a digest method URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2000/09/xmldsig#sha1" => Some(Self::Sha1),
            "http://www.w3.org/2001/04/xmlenc#sha256" => Some(Self::Sha256),
            "http://www.w3.org/2001/04/xmldsig-more#sha384" => Some(Self::Sha384),
            "http://www.w3.org/2001/04/xmlenc#sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Returns true for digests that must not be accepted unless explicitly allowed.
    #[must_use]
    pub const fn is_deprecated(self) -> bool {
        matches!(self, Self::Sha1)
    }
}

/// RSA PKCS#1 v1.5 signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSA with SHA-1 (legacy, verification only).
    #[serde(rename = "rsa-sha1")]
    RsaSha1,

    /// RSA with SHA-256.
    #[default]
    #[serde(rename = "rsa-sha256")]
    RsaSha256,

    /// RSA with SHA-384.
    #[serde(rename = "rsa-sha384")]
    RsaSha384,

    /// RSA with SHA-512.
    #[serde(rename = "rsa-sha512")]
    RsaSha512,
}

impl SignatureAlgorithm {
    /// Returns the XML-DSig signature method URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::RsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    /// Parses a signature method URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2000/09/xmldsig#rsa-sha1" => Some(Self::RsaSha1),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" => Some(Self::RsaSha256),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384" => Some(Self::RsaSha384),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512" => Some(Self::RsaSha512),
            _ => None,
        }
    }

    /// Returns the digest algorithm paired with this signature algorithm.
    #[must_use]
    pub const fn digest(self) -> HashAlgorithm {
        match self {
            Self::RsaSha1 => HashAlgorithm::Sha1,
            Self::RsaSha256 => HashAlgorithm::Sha256,
            Self::RsaSha384 => HashAlgorithm::Sha384,
            Self::RsaSha512 => HashAlgorithm::Sha512,
        }
    }

    /// Returns true if the algorithm relies on SHA-1.
    #[must_use]
    pub const fn is_deprecated(self) -> bool {
        matches!(self, Self::RsaSha1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_uris_round_trip() {
        for alg in [
            SignatureAlgorithm::RsaSha1,
            SignatureAlgorithm::RsaSha256,
            SignatureAlgorithm::RsaSha384,
            SignatureAlgorithm::RsaSha512,
        ] {
            assert_eq!(SignatureAlgorithm::from_uri(alg.uri()), Some(alg));
            assert_eq!(HashAlgorithm::from_uri(alg.digest().uri()), Some(alg.digest()));
        }
    }

    #[test]
    fn unknown_uri_is_rejected() {
        assert_eq!(SignatureAlgorithm::from_uri("http://example.com/rsa-md5"), None);
        assert_eq!(HashAlgorithm::from_uri(""), None);
    }

    #[test]
    fn only_sha1_is_deprecated() {
        assert!(SignatureAlgorithm::RsaSha1.is_deprecated());
        assert!(!SignatureAlgorithm::RsaSha256.is_deprecated());
        assert!(HashAlgorithm::Sha1.is_deprecated());
    }

    #[test]
    fn config_names_deserialize() {
        let alg: SignatureAlgorithm = serde_json::from_str("\"rsa-sha512\"").unwrap();
        assert_eq!(alg, SignatureAlgorithm::RsaSha512);
        assert_eq!(SignatureAlgorithm::default(), SignatureAlgorithm::RsaSha256);
    }
}
