//! HTTP-Redirect Binding implementation.
//!
//! Messages travel in the query string as raw DEFLATE, then base64, then
//! URL encoding. Signatures are detached (`SigAlg` + `Signature`).

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{SamlError, SamlResult};
use crate::signature::{redirect_signed_query, XmlSigner};

use super::{strip_whitespace, SamlMessageType};

/// Largest inflated message accepted from either binding (1 MiB).
pub const MAX_INFLATED_SIZE: usize = 1024 * 1024;

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Deflates and base64-encodes `xml`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MalformedBinding`] if compression fails.
    pub fn encode_message(xml: &str) -> SamlResult<String> {
        let compressed = deflate_compress(xml.as_bytes())?;
        Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
    }

    /// Reverses [`HttpRedirectBinding::encode_message`].
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MalformedBinding`] on bad base64, inflate
    /// failure, output over [`MAX_INFLATED_SIZE`] or non-UTF-8 output.
    pub fn decode_message(encoded: &str) -> SamlResult<String> {
        let compact = strip_whitespace(encoded);
        let raw = base64::engine::general_purpose::STANDARD.decode(compact.as_bytes())?;
        let inflated = deflate_decompress(&raw)?;
        String::from_utf8(inflated)
            .map_err(|e| SamlError::MalformedBinding(format!("invalid UTF-8 in message: {e}")))
    }

    /// Builds the redirect URL for a message.
    ///
    /// With a signer, the detached `SigAlg` and `Signature` parameters are
    /// appended.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or signing fails.
    pub fn encode_url(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<String> {
        let encoded = Self::encode_message(xml)?;
        let relay_state = relay_state.filter(|rs| !rs.is_empty());
        let separator = if destination.contains('?') { '&' } else { '?' };

        let query = match signer {
            Some(signer) => {
                let (sig_alg, signature) =
                    signer.sign_redirect_binding(&encoded, relay_state, message_type)?;
                format!(
                    "{}&Signature={}",
                    redirect_signed_query(message_type, &encoded, relay_state, &sig_alg),
                    urlencoding::encode(&signature)
                )
            }
            None => {
                let mut query = format!(
                    "{}={}",
                    message_type.form_param(),
                    urlencoding::encode(&encoded)
                );
                if let Some(rs) = relay_state {
                    query.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
                }
                query
            }
        };

        Ok(format!("{destination}{separator}{query}"))
    }
}

/// SAML parameters carried by a redirect URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectParams {
    /// Encoded `SAMLRequest` or `SAMLResponse` value.
    pub message: String,
    /// Which parameter carried the message.
    pub message_type: Option<SamlMessageType>,
    /// `RelayState`, if present.
    pub relay_state: Option<String>,
    /// `SigAlg`, if present.
    pub sig_alg: Option<String>,
    /// `Signature`, if present.
    pub signature: Option<String>,
}

impl RedirectParams {
    /// Extracts the SAML parameters from a full URL.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidRequest`] if the URL is invalid or has no
    /// SAML message.
    pub fn from_url(url: &str) -> SamlResult<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::InvalidRequest(format!("invalid URL: {e}")))?;

        let mut params = Self::default();
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "SAMLRequest" => {
                    params.message = value.into_owned();
                    params.message_type = Some(SamlMessageType::Request);
                }
                "SAMLResponse" => {
                    params.message = value.into_owned();
                    params.message_type = Some(SamlMessageType::Response);
                }
                "RelayState" => params.relay_state = Some(value.into_owned()),
                "SigAlg" => params.sig_alg = Some(value.into_owned()),
                "Signature" => params.signature = Some(value.into_owned()),
                _ => {}
            }
        }

        if params.message_type.is_none() {
            return Err(SamlError::InvalidRequest(
                "no SAMLRequest or SAMLResponse parameter".to_string(),
            ));
        }
        Ok(params)
    }

    /// Decodes the carried message.
    ///
    /// # Errors
    ///
    /// See [`HttpRedirectBinding::decode_message`].
    pub fn decode(&self) -> SamlResult<String> {
        HttpRedirectBinding::decode_message(&self.message)
    }

    /// Rebuilds the octet string covered by the detached signature.
    #[must_use]
    pub fn signed_query(&self) -> Option<String> {
        let sig_alg = self.sig_alg.as_deref()?;
        Some(redirect_signed_query(
            self.message_type?,
            &self.message,
            self.relay_state.as_deref(),
            sig_alg,
        ))
    }
}

/// Compresses data using DEFLATE (raw, no zlib header).
pub(crate) fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::MalformedBinding(format!("compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::MalformedBinding(format!("compression finish error: {e}")))
}

/// Why a DEFLATE payload could not be inflated.
#[derive(Debug)]
pub(crate) enum InflateError {
    /// Not a valid raw DEFLATE stream.
    Corrupt(std::io::Error),
    /// Output would exceed [`MAX_INFLATED_SIZE`].
    TooLarge,
}

impl From<InflateError> for SamlError {
    fn from(err: InflateError) -> Self {
        match err {
            InflateError::Corrupt(e) => Self::MalformedBinding(format!("inflate error: {e}")),
            InflateError::TooLarge => Self::MalformedBinding(format!(
                "inflated message exceeds {MAX_INFLATED_SIZE} bytes"
            )),
        }
    }
}

/// Decompresses raw DEFLATE data, refusing output over [`MAX_INFLATED_SIZE`].
pub(crate) fn deflate_decompress(data: &[u8]) -> Result<Vec<u8>, InflateError> {
    let limit = MAX_INFLATED_SIZE as u64 + 1;
    let mut decoder = DeflateDecoder::new(data).take(limit);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(InflateError::Corrupt)?;
    if decompressed.len() > MAX_INFLATED_SIZE {
        return Err(InflateError::TooLarge);
    }
    Ok(decompressed)
}
