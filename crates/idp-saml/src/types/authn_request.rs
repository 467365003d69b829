//! SAML AuthnRequest types.
//!
//! The validated form of an `<samlp:AuthnRequest>`. Instances are only
//! produced by [`crate::request::RequestParser`], after every check passed.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AuthnContextClass, SamlBinding};

/// A validated SAML authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthnRequest {
    /// Request `ID`, echoed back as `InResponseTo`.
    pub id: String,

    /// Protocol version (always "2.0" once validated).
    pub version: String,

    /// `IssueInstant`.
    pub issue_instant: DateTime<Utc>,

    /// Entity ID of the issuing service provider.
    pub issuer: String,

    /// `Destination` attribute, if present.
    pub destination: Option<String>,

    /// `AssertionConsumerServiceURL` override.
    pub assertion_consumer_service_url: Option<String>,

    /// `AssertionConsumerServiceIndex` override.
    pub assertion_consumer_service_index: Option<u16>,

    /// `ProtocolBinding` requested for the response.
    pub protocol_binding: Option<SamlBinding>,

    /// `<samlp:NameIDPolicy>` constraints.
    pub name_id_policy: Option<NameIdPolicy>,

    /// Requested `AuthnContextClassRef` values, in document order.
    pub requested_authn_context: Vec<String>,

    /// Whether the IdP must re-authenticate the user.
    pub force_authn: bool,

    /// Whether the IdP must not interact with the user.
    pub is_passive: bool,

    /// Whether the request carried a signature that was verified.
    pub signed: bool,
}

impl AuthnRequest {
    /// Returns the requested authentication context class reference,
    /// falling back to the password class when none was requested.
    #[must_use]
    pub fn authn_context_class_ref(&self) -> &str {
        self.requested_authn_context
            .first()
            .map_or(AuthnContextClass::default().uri(), String::as_str)
    }

    /// Returns the requested NameID format URI, if any.
    #[must_use]
    pub fn requested_name_id_format(&self) -> Option<&str> {
        self.name_id_policy.as_ref().and_then(|p| p.format.as_deref())
    }
}

/// `<samlp:NameIDPolicy>` from the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NameIdPolicy {
    /// Requested format URI.
    pub format: Option<String>,
    /// `SPNameQualifier` attribute.
    pub sp_name_qualifier: Option<String>,
    /// `AllowCreate` attribute.
    pub allow_create: bool,
}
