//! Cryptographically secure random identifiers.
//!
//! SAML `ID` attributes are `xs:ID` values and must be valid NCNames, so
//! every identifier produced here starts with an underscore.

use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Generates `len` random bytes from the thread-local CSPRNG.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a random alphanumeric string.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates a SAML message or assertion ID (`_` followed by 40 hex digits).
///
/// 160 random bits, above the 128 bits SAML core requires for identifier uniqueness.
#[must_use]
pub fn generate_saml_id() -> String {
    let mut id = String::with_capacity(41);
    id.push('_');
    for byte in random_bytes(20) {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

/// Generates an `AuthnStatement` session index.
#[must_use]
pub fn generate_session_index() -> String {
    format!("_{}", random_alphanumeric(32))
}
