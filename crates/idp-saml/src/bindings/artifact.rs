//! HTTP-Artifact binding.
//!
//! Only the transport encoding is handled here. Resolving an artifact
//! against the issuer's `ArtifactResolutionService` is not supported.

use base64::Engine;

use crate::error::{SamlError, SamlResult};

use super::strip_whitespace;

/// HTTP-Artifact binding encoder/decoder.
pub struct HttpArtifactBinding;

impl HttpArtifactBinding {
    /// Base64-encodes the payload.
    #[must_use]
    pub fn encode_message(payload: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(payload)
    }

    /// Base64-decodes the payload. No inflating and no XML unwrapping.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MalformedBinding`] on bad base64 or non-UTF-8
    /// output.
    pub fn decode_message(encoded: &str) -> SamlResult<String> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(strip_whitespace(encoded).as_bytes())?;
        String::from_utf8(raw)
            .map_err(|e| SamlError::MalformedBinding(format!("artifact is not text: {e}")))
    }
}
