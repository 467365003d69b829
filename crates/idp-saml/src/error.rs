//! SAML error types.
//!
//! Every failure in the request/response pipeline surfaces as a
//! [`SamlError`]. Callers translate it to an HTTP status with
//! [`SamlError::http_status`] or to a SAML `<StatusCode>` with
//! [`SamlError::status_code`].

use thiserror::Error;

use crate::types::{status_codes, sub_status_codes};

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Transport payload could not be decoded (bad base64, inflate failure).
    #[error("malformed binding payload: {0}")]
    MalformedBinding(String),

    /// Binding identifier is not one of the four SAML 2.0 bindings.
    #[error("unknown binding: {0}")]
    UnknownBinding(String),

    /// Decoding through a binding failed.
    #[error("failed to unravel {binding} message: {reason}")]
    UnravelError {
        /// Binding URI the payload arrived on.
        binding: String,
        /// Underlying failure.
        reason: String,
    },

    /// Entity ID is not present in the metadata registry.
    #[error("unknown principal: {0}")]
    UnknownPrincipal(String),

    /// No binding is supported by both the IdP and the SP.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// The processor refused access for the principal.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Building or signing the response failed.
    #[error("response construction failed: {0}")]
    ResponseConstructionError(String),

    /// IdP or SP configuration is invalid.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Invalid SAML request format or content.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// XML or redirect signature validation failed.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SamlError {
    /// Wraps any decode failure as an [`SamlError::UnravelError`] for `binding`.
    #[must_use]
    pub fn unravel(binding: &str, err: impl std::fmt::Display) -> Self {
        Self::UnravelError {
            binding: binding.to_string(),
            reason: err.to_string(),
        }
    }

    /// Returns the top-level SAML status code for this error.
    #[must_use]
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::MalformedBinding(_)
            | Self::UnknownBinding(_)
            | Self::UnravelError { .. }
            | Self::UnknownPrincipal(_)
            | Self::UnsupportedBinding(_)
            | Self::AccessDenied(_)
            | Self::InvalidRequest(_)
            | Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::SignatureInvalid(_) => status_codes::REQUESTER,
            Self::ResponseConstructionError(_)
            | Self::ConfigurationError(_)
            | Self::Crypto(_)
            | Self::Internal(_) => status_codes::RESPONDER,
        }
    }

    /// Returns a second-level status code if applicable.
    #[must_use]
    pub fn sub_status_code(&self) -> Option<&'static str> {
        match self {
            Self::UnknownPrincipal(_) => Some(sub_status_codes::UNKNOWN_PRINCIPAL),
            Self::UnsupportedBinding(_) => Some(sub_status_codes::UNSUPPORTED_BINDING),
            Self::AccessDenied(_) => Some(sub_status_codes::REQUEST_DENIED),
            _ => None,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::MalformedBinding(_)
            | Self::UnknownBinding(_)
            | Self::UnravelError { .. }
            | Self::UnknownPrincipal(_)
            | Self::InvalidRequest(_)
            | Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::SignatureInvalid(_) => 400,
            Self::AccessDenied(_) => 403,
            Self::UnsupportedBinding(_)
            | Self::ResponseConstructionError(_)
            | Self::ConfigurationError(_)
            | Self::Crypto(_)
            | Self::Internal(_) => 500,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::MalformedBinding(format!("base64: {err}"))
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::MalformedBinding(format!("deflate: {err}"))
    }
}

impl From<idp_crypto::CryptoError> for SamlError {
    fn from(err: idp_crypto::CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}
