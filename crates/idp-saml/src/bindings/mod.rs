//! SAML binding codec.
//!
//! Converts between transport payloads and XML text for the four SAML 2.0
//! bindings:
//!
//! - **HTTP-Redirect** - deflate, base64, query string
//! - **HTTP-POST** - base64 in an auto-submitting HTML form
//! - **SOAP** - SOAP 1.1 envelope
//! - **HTTP-Artifact** - base64 only
//!
//! [`decode`] is the inbound entry point. It names unknown bindings with
//! [`SamlError::UnknownBinding`] and reports every other failure as
//! [`SamlError::UnravelError`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use idp_saml::bindings::{self, HttpRedirectBinding, SamlMessageType};
//!
//! // Inbound: the binding URI comes from the request that carried the message
//! let xml = bindings::decode(&form.saml_request, &binding_uri, SamlMessageType::Request)?;
//!
//! // Outbound over HTTP-Redirect, with a detached signature
//! let url = HttpRedirectBinding::encode_url(&response_xml, &acs_url, relay_state, SamlMessageType::Response, Some(&signer))?;
//! ```

mod artifact;
mod post;
mod redirect;
mod soap;

pub use artifact::*;
pub use post::*;
pub use redirect::*;
pub use soap::*;

pub(crate) use post::html_escape;

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::SamlBinding;

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// A protocol request (`AuthnRequest`, queries, `ArtifactResolve`).
    Request,
    /// A protocol response.
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }

    /// Returns `"request"` or `"response"`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

/// Decodes a transport payload into XML text.
///
/// `binding` is the binding URI as received.
///
/// # Errors
///
/// - [`SamlError::UnknownBinding`] if `binding` is not a SAML 2.0 binding URI
/// - [`SamlError::UnravelError`] for any decoding failure
pub fn decode(raw: &str, binding: &str, message_type: SamlMessageType) -> SamlResult<String> {
    let binding: SamlBinding = binding.parse()?;
    decode_with(raw, binding, message_type)
}

/// Like [`decode`], for an already resolved binding.
///
/// # Errors
///
/// Returns [`SamlError::UnravelError`] for any decoding failure.
pub fn decode_with(
    raw: &str,
    binding: SamlBinding,
    message_type: SamlMessageType,
) -> SamlResult<String> {
    let result = match binding {
        SamlBinding::HttpRedirect => HttpRedirectBinding::decode_message(raw),
        SamlBinding::HttpPost => HttpPostBinding::decode_message(raw),
        SamlBinding::Soap => SoapBinding::unwrap(raw, message_type),
        SamlBinding::HttpArtifact => HttpArtifactBinding::decode_message(raw),
    };
    result.map_err(|e| {
        tracing::debug!(binding = %binding, error = %e, "failed to decode SAML message");
        SamlError::unravel(binding.uri(), e)
    })
}

/// Encodes XML text into the transport payload of `binding`.
///
/// # Errors
///
/// Returns [`SamlError::MalformedBinding`] if compression fails.
pub fn encode(xml: &str, binding: SamlBinding) -> SamlResult<String> {
    match binding {
        SamlBinding::HttpRedirect => HttpRedirectBinding::encode_message(xml),
        SamlBinding::HttpPost => Ok(HttpPostBinding::encode_message(xml)),
        SamlBinding::Soap => Ok(SoapBinding::wrap(xml)),
        SamlBinding::HttpArtifact => Ok(HttpArtifactBinding::encode_message(xml)),
    }
}

/// An outbound message ready to hand to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Self-submitting HTML form (HTTP-POST).
    Form {
        /// The HTML document.
        html: String,
    },
    /// Redirect target (HTTP-Redirect).
    Redirect {
        /// The full `Location` URL.
        location: String,
    },
}

/// Applies a front-channel binding to an outbound message.
///
/// For HTTP-Redirect, a `signer` adds the detached query signature.
/// POST messages carry their signature inside the XML.
///
/// # Errors
///
/// Returns [`SamlError::UnsupportedBinding`] for back-channel bindings, or
/// a signing/compression error for redirects.
pub fn apply_binding(
    binding: SamlBinding,
    xml: &str,
    destination: &str,
    relay_state: Option<&str>,
    message_type: SamlMessageType,
    signer: Option<&XmlSigner>,
) -> SamlResult<OutboundMessage> {
    match binding {
        SamlBinding::HttpPost => Ok(OutboundMessage::Form {
            html: HttpPostBinding::encode_form(xml, destination, relay_state, message_type),
        }),
        SamlBinding::HttpRedirect => Ok(OutboundMessage::Redirect {
            location: HttpRedirectBinding::encode_url(
                xml,
                destination,
                relay_state,
                message_type,
                signer,
            )?,
        }),
        other => Err(SamlError::UnsupportedBinding(format!(
            "{other} cannot deliver a message through the browser"
        ))),
    }
}

/// Removes whitespace that mail clients and form encoders insert into
/// base64 payloads.
pub(crate) fn strip_whitespace(encoded: &str) -> String {
    encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    const XML: &str = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_abc"/>"#;

    #[test]
    fn redirect_round_trip() {
        let payload = encode(XML, SamlBinding::HttpRedirect).unwrap();
        let decoded = decode(
            &payload,
            SamlBinding::HttpRedirect.uri(),
            SamlMessageType::Request,
        )
        .unwrap();
        assert_eq!(decoded, XML);
    }

    #[test]
    fn post_round_trip_and_fallback() {
        let payload = encode(XML, SamlBinding::HttpPost).unwrap();
        assert_eq!(
            decode(&payload, SamlBinding::HttpPost.uri(), SamlMessageType::Request).unwrap(),
            XML
        );

        let plain = base64::engine::general_purpose::STANDARD.encode(XML);
        assert_eq!(
            decode_with(&plain, SamlBinding::HttpPost, SamlMessageType::Request).unwrap(),
            XML
        );
    }

    #[test]
    fn unknown_binding_names_identifier() {
        let err = decode("abc", "urn:example:binding", SamlMessageType::Request).unwrap_err();
        match err {
            SamlError::UnknownBinding(id) => assert_eq!(id, "urn:example:binding"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn failures_are_unravel_errors() {
        let err = decode(
            "%%%",
            SamlBinding::HttpRedirect.uri(),
            SamlMessageType::Request,
        )
        .unwrap_err();
        match err {
            SamlError::UnravelError { binding, .. } => {
                assert_eq!(binding, SamlBinding::HttpRedirect.uri());
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = decode_with("<notsoap/>", SamlBinding::Soap, SamlMessageType::Request).unwrap_err();
        assert!(matches!(err, SamlError::UnravelError { .. }));
    }

    #[test]
    fn apply_post_and_redirect() {
        let form = apply_binding(
            SamlBinding::HttpPost,
            XML,
            "https://sp.example.com/acs",
            Some("rs"),
            SamlMessageType::Response,
            None,
        )
        .unwrap();
        assert!(matches!(form, OutboundMessage::Form { ref html } if html.contains("SAMLResponse")));

        let redirect = apply_binding(
            SamlBinding::HttpRedirect,
            XML,
            "https://sp.example.com/acs",
            Some("rs"),
            SamlMessageType::Response,
            None,
        )
        .unwrap();
        match redirect {
            OutboundMessage::Redirect { location } => {
                let params = RedirectParams::from_url(&location).unwrap();
                assert_eq!(params.decode().unwrap(), XML);
                assert_eq!(params.relay_state.as_deref(), Some("rs"));
            }
            OutboundMessage::Form { .. } => panic!("expected redirect"),
        }
    }

    #[test]
    fn soap_cannot_reach_the_browser() {
        let result = apply_binding(
            SamlBinding::Soap,
            XML,
            "https://sp.example.com/acs",
            None,
            SamlMessageType::Response,
            None,
        );
        assert!(matches!(result, Err(SamlError::UnsupportedBinding(_))));
    }
}
