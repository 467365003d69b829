//! AuthnRequest parsing and validation.
//!
//! [`RequestParser::parse`] either returns a fully validated
//! [`AuthnRequest`] or an error; there is no partially filled request.
//! Signatures are always verified when present, and required when the SP
//! asks for signed requests.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::metadata::{KeyUsage, MetadataRegistry};
use crate::signature::{has_enveloped_signature, redirect_signed_query, XmlSignatureValidator};
use crate::types::{AuthnRequest, NameIdPolicy, SamlBinding, SAMLP_NS, SAML_NS};
use crate::xml::{self, Element};
use crate::bindings::SamlMessageType;

/// Per-SP signature requirements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignaturePolicy {
    /// Reject unsigned requests.
    pub want_authn_requests_signed: bool,
    /// Accept RSA-SHA1 signatures and SHA-1 digests.
    pub allow_sha1: bool,
}

/// The detached signature of an HTTP-Redirect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedSignature {
    /// The octets the SP signed: `SAMLRequest=…[&RelayState=…]&SigAlg=…`
    /// exactly as they appeared in the query string.
    pub signed_query: String,
    /// `SigAlg` URI.
    pub sig_alg: String,
    /// Base64 `Signature` value.
    pub signature: String,
}

impl DetachedSignature {
    /// Extracts the signature from a raw (still URL-encoded) query string.
    ///
    /// Returns `None` when `SigAlg` or `Signature` is absent.
    #[must_use]
    pub fn from_raw_query(raw_query: &str) -> Option<Self> {
        let mut message = None;
        let mut relay_state = None;
        let mut sig_alg = None;
        let mut signature = None;

        for pair in raw_query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "SAMLRequest" => message = Some(pair),
                "RelayState" => relay_state = Some(pair),
                "SigAlg" => sig_alg = Some((pair, value)),
                "Signature" => signature = Some(value),
                _ => {}
            }
        }

        let (sig_alg_pair, sig_alg_raw) = sig_alg?;
        let signature_raw = signature?;
        let mut signed_query = message?.to_string();
        if let Some(rs) = relay_state {
            signed_query.push('&');
            signed_query.push_str(rs);
        }
        signed_query.push('&');
        signed_query.push_str(sig_alg_pair);

        Some(Self {
            signed_query,
            sig_alg: form_decode(sig_alg_raw),
            signature: form_decode(signature_raw),
        })
    }

    /// Rebuilds the signature from already decoded parameters.
    ///
    /// Used when only decoded values are available; the query is
    /// re-encoded the way the IdP itself encodes redirect queries.
    #[must_use]
    pub fn from_decoded(
        encoded_message: &str,
        relay_state: Option<&str>,
        sig_alg: &str,
        signature: &str,
    ) -> Self {
        Self {
            signed_query: redirect_signed_query(
                SamlMessageType::Request,
                encoded_message,
                relay_state,
                sig_alg,
            ),
            sig_alg: sig_alg.to_string(),
            signature: signature.to_string(),
        }
    }
}

fn form_decode(raw: &str) -> String {
    url::form_urlencoded::parse(format!("v={raw}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// Parses and validates incoming `AuthnRequest`s.
#[derive(Debug, Clone)]
pub struct RequestParser {
    registry: Arc<MetadataRegistry>,
    sso_locations: Vec<String>,
    policies: HashMap<String, SignaturePolicy>,
}

impl RequestParser {
    /// Creates a parser.
    ///
    /// `sso_locations` are the IdP URLs a request's `Destination` may name.
    #[must_use]
    pub fn new(registry: Arc<MetadataRegistry>, sso_locations: Vec<String>) -> Self {
        Self {
            registry,
            sso_locations,
            policies: HashMap::new(),
        }
    }

    /// Sets the signature policy of one SP.
    #[must_use]
    pub fn with_policy(mut self, entity_id: impl Into<String>, policy: SignaturePolicy) -> Self {
        self.policies.insert(entity_id.into(), policy);
        self
    }

    /// Parses `xml`, received over `binding`, into a validated request.
    ///
    /// `detached` carries the `SigAlg`/`Signature` parameters of a signed
    /// HTTP-Redirect request.
    ///
    /// # Errors
    ///
    /// - [`SamlError::XmlParse`] for malformed XML (including any DOCTYPE)
    /// - [`SamlError::InvalidRequest`] / [`SamlError::MissingElement`] for
    ///   structural problems
    /// - [`SamlError::UnknownPrincipal`] if the issuer is not registered
    /// - [`SamlError::SignatureInvalid`] for failed or missing signatures
    pub fn parse(
        &self,
        xml: &str,
        binding: SamlBinding,
        detached: Option<&DetachedSignature>,
    ) -> SamlResult<AuthnRequest> {
        let root = xml::parse(xml)?;
        if !root.is(SAMLP_NS, "AuthnRequest") {
            return Err(SamlError::InvalidRequest(format!(
                "expected samlp:AuthnRequest, found {}",
                root.qname()
            )));
        }

        let mut request = read_request(&root)?;
        let descriptor = self.registry.entity_descriptor(&request.issuer)?;
        tracing::debug!(issuer = %request.issuer, id = %request.id, "parsed AuthnRequest");

        if let Some(destination) = &request.destination {
            if !self.sso_locations.iter().any(|l| l == destination) {
                return Err(SamlError::InvalidRequest(format!(
                    "Destination {destination} is not an SSO location of this IdP"
                )));
            }
        }
        if let Some(url) = &request.assertion_consumer_service_url {
            self.registry.endpoint_by_location(&request.issuer, url)?;
        }
        if let Some(index) = request.assertion_consumer_service_index {
            self.registry.endpoint_by_index(&request.issuer, index)?;
        }

        let mut policy = self.policies.get(&request.issuer).copied().unwrap_or_default();
        policy.want_authn_requests_signed |= descriptor.authn_requests_signed;
        request.signed = self.verify_signatures(&root, &request.issuer, binding, detached, policy)?;

        Ok(request)
    }

    fn verify_signatures(
        &self,
        root: &Element,
        issuer: &str,
        binding: SamlBinding,
        detached: Option<&DetachedSignature>,
        policy: SignaturePolicy,
    ) -> SamlResult<bool> {
        let enveloped = has_enveloped_signature(root);
        if detached.is_none() && !enveloped {
            if policy.want_authn_requests_signed {
                tracing::warn!(issuer, "rejected unsigned AuthnRequest");
                return Err(SamlError::SignatureInvalid(format!(
                    "{issuer} requires signed AuthnRequests"
                )));
            }
            return Ok(false);
        }

        let validator = XmlSignatureValidator::new(self.registry.certs_for(issuer, KeyUsage::Signing)?)
            .allow_sha1(policy.allow_sha1);

        if let Some(detached) = detached {
            if binding != SamlBinding::HttpRedirect {
                return Err(SamlError::InvalidRequest(format!(
                    "SigAlg/Signature parameters are not valid with {binding}"
                )));
            }
            validator
                .validate_redirect_binding(&detached.signed_query, &detached.signature, &detached.sig_alg)
                .inspect_err(|e| tracing::warn!(issuer, error = %e, "redirect signature rejected"))?;
        }
        if enveloped {
            validator
                .validate_element(root, root)
                .inspect_err(|e| tracing::warn!(issuer, error = %e, "enveloped signature rejected"))?;
        }
        Ok(true)
    }
}

fn read_request(root: &Element) -> SamlResult<AuthnRequest> {
    let id = root
        .attr("ID")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SamlError::InvalidRequest("AuthnRequest has no ID".to_string()))?;

    let version = root.attr("Version").unwrap_or_default();
    if version != "2.0" {
        return Err(SamlError::InvalidRequest(format!("unsupported SAML version '{version}'")));
    }

    let issue_instant = root
        .attr("IssueInstant")
        .ok_or_else(|| SamlError::InvalidRequest("AuthnRequest has no IssueInstant".to_string()))
        .and_then(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| SamlError::InvalidRequest(format!("bad IssueInstant '{raw}': {e}")))
        })?;

    let issuer = root
        .child(SAML_NS, "Issuer")
        .map(|i| i.text().trim().to_string())
        .filter(|i| !i.is_empty())
        .ok_or_else(|| SamlError::MissingElement("Issuer".to_string()))?;

    let assertion_consumer_service_index = root
        .attr("AssertionConsumerServiceIndex")
        .map(str::parse::<u16>)
        .transpose()
        .map_err(|e| SamlError::InvalidRequest(format!("bad AssertionConsumerServiceIndex: {e}")))?;

    let protocol_binding = root
        .attr("ProtocolBinding")
        .map(|uri| {
            SamlBinding::from_uri(uri)
                .ok_or_else(|| SamlError::UnsupportedBinding(format!("ProtocolBinding {uri}")))
        })
        .transpose()?;

    let name_id_policy = root.child(SAMLP_NS, "NameIDPolicy").map(|p| NameIdPolicy {
        format: p.attr("Format").map(String::from),
        sp_name_qualifier: p.attr("SPNameQualifier").map(String::from),
        allow_create: p.attr("AllowCreate").is_some_and(is_true),
    });

    let requested_authn_context = root
        .child(SAMLP_NS, "RequestedAuthnContext")
        .map(|ctx| {
            ctx.children_named(SAML_NS, "AuthnContextClassRef")
                .map(|r| r.text().trim().to_string())
                .filter(|r| !r.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(AuthnRequest {
        id: id.to_string(),
        version: version.to_string(),
        issue_instant,
        issuer,
        destination: root.attr("Destination").map(String::from),
        assertion_consumer_service_url: root.attr("AssertionConsumerServiceURL").map(String::from),
        assertion_consumer_service_index,
        protocol_binding,
        name_id_policy,
        requested_authn_context,
        force_authn: root.attr("ForceAuthn").is_some_and(is_true),
        is_passive: root.attr("IsPassive").is_some_and(is_true),
        signed: false,
    })
}

fn is_true(value: &str) -> bool {
    matches!(value, "true" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::HttpRedirectBinding;
    use crate::metadata::EntityDescriptor;
    use crate::signature::test_support::{idp_credential, sp_credential, SP_CERT};
    use crate::signature::XmlSigner;
    use idp_crypto::Certificate;

    const SSO: &str = "https://idp.example.com/sso";
    const SP: &str = "https://sp.example.com";

    fn parser() -> RequestParser {
        let registry = MetadataRegistry::with_entities([EntityDescriptor::new(SP)
            .with_acs(SamlBinding::HttpPost, "https://sp.example.com/acs", 0)
            .with_key(KeyUsage::Signing, Certificate::from_pem(SP_CERT).unwrap())]);
        RequestParser::new(Arc::new(registry), vec![SSO.to_string()])
    }

    fn request_xml(extra_attrs: &str, body: &str) -> String {
        format!(
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_abc123" Version="2.0" IssueInstant="2024-01-01T00:00:00Z"{extra_attrs}><saml:Issuer>{SP}</saml:Issuer>{body}</samlp:AuthnRequest>"#
        )
    }

    #[test]
    fn parses_valid_request() {
        let xml = request_xml(
            &format!(r#" Destination="{SSO}" AssertionConsumerServiceURL="https://sp.example.com/acs" ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" IsPassive="false""#),
            r#"<samlp:NameIDPolicy Format="urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified" AllowCreate="true"/><samlp:RequestedAuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:Password</saml:AuthnContextClassRef></samlp:RequestedAuthnContext>"#,
        );
        let request = parser().parse(&xml, SamlBinding::HttpPost, None).unwrap();

        assert_eq!(request.id, "_abc123");
        assert_eq!(request.issuer, SP);
        assert_eq!(request.protocol_binding, Some(SamlBinding::HttpPost));
        assert_eq!(
            request.authn_context_class_ref(),
            "urn:oasis:names:tc:SAML:2.0:ac:classes:Password"
        );
        assert!(request.name_id_policy.as_ref().unwrap().allow_create);
        assert!(!request.signed);
    }

    #[test]
    fn authn_context_defaults_to_password_class() {
        let request = parser()
            .parse(&request_xml("", ""), SamlBinding::HttpPost, None)
            .unwrap();
        assert_eq!(
            request.authn_context_class_ref(),
            "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport"
        );
    }

    #[test]
    fn structural_failures_are_rejected() {
        let parser = parser();
        let cases = [
            "<notxml",
            r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"/>"#,
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" Version="2.0" IssueInstant="2024-01-01T00:00:00Z"/>"#,
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_1" Version="1.1" IssueInstant="2024-01-01T00:00:00Z"/>"#,
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_1" Version="2.0" IssueInstant="2024-01-01T00:00:00Z"/>"#,
        ];
        for xml in cases {
            assert!(parser.parse(xml, SamlBinding::HttpPost, None).is_err(), "{xml}");
        }
    }

    #[test]
    fn deeply_nested_redirect_request_is_refused() {
        // The request element itself is the first level.
        let levels = crate::xml::MAX_DEPTH;
        let body = format!("{}{}", "<x>".repeat(levels), "</x>".repeat(levels));
        let encoded = HttpRedirectBinding::encode_message(&request_xml("", &body)).unwrap();

        let xml = crate::bindings::decode_with(&encoded, SamlBinding::HttpRedirect, SamlMessageType::Request)
            .unwrap();
        assert!(matches!(
            parser().parse(&xml, SamlBinding::HttpRedirect, None),
            Err(SamlError::XmlParse(ref m)) if m.contains("nested")
        ));

        let shallower = format!("{}{}", "<x>".repeat(levels - 1), "</x>".repeat(levels - 1));
        let xml = request_xml("", &shallower);
        assert!(!matches!(
            parser().parse(&xml, SamlBinding::HttpRedirect, None),
            Err(SamlError::XmlParse(_))
        ));
    }

    #[test]
    fn doctype_is_rejected() {
        let xml = format!(
            "<!DOCTYPE x [<!ENTITY a \"aaaa\">]>{}",
            request_xml("", "")
        );
        assert!(matches!(
            parser().parse(&xml, SamlBinding::HttpPost, None),
            Err(SamlError::XmlParse(_))
        ));
    }

    #[test]
    fn unknown_issuer_is_unknown_principal() {
        let xml = request_xml("", "").replace(SP, "https://stranger.example.com");
        assert!(matches!(
            parser().parse(&xml, SamlBinding::HttpPost, None),
            Err(SamlError::UnknownPrincipal(_))
        ));
    }

    #[test]
    fn foreign_destination_and_acs_are_rejected() {
        let parser = parser();
        let xml = request_xml(r#" Destination="https://other-idp.example.com/sso""#, "");
        assert!(matches!(
            parser.parse(&xml, SamlBinding::HttpPost, None),
            Err(SamlError::InvalidRequest(_))
        ));

        let xml = request_xml(r#" AssertionConsumerServiceURL="https://evil.example.com/acs""#, "");
        assert!(matches!(
            parser.parse(&xml, SamlBinding::HttpPost, None),
            Err(SamlError::InvalidRequest(_))
        ));
    }

    #[test]
    fn enveloped_signature_is_verified() {
        let signer = XmlSigner::new(Arc::new(sp_credential()));
        let signed = signer.sign(&request_xml("", ""), "_abc123").unwrap();

        let request = parser().parse(&signed, SamlBinding::HttpPost, None).unwrap();
        assert!(request.signed);

        let tampered = signed.replace("2024-01-01T00:00:00Z", "2024-01-01T00:00:01Z");
        assert!(matches!(
            parser().parse(&tampered, SamlBinding::HttpPost, None),
            Err(SamlError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn signature_from_wrong_key_is_rejected() {
        let signer = XmlSigner::new(Arc::new(idp_credential()));
        let signed = signer.sign(&request_xml("", ""), "_abc123").unwrap();
        assert!(matches!(
            parser().parse(&signed, SamlBinding::HttpPost, None),
            Err(SamlError::SignatureInvalid(_))
        ));
    }

    fn signed_redirect(signer: &XmlSigner, xml: &str) -> (String, DetachedSignature) {
        let url = HttpRedirectBinding::encode_url(
            xml,
            SSO,
            Some("relay state"),
            SamlMessageType::Request,
            Some(signer),
        )
        .unwrap();
        let raw_query = url.split_once('?').unwrap().1.to_string();
        let detached = DetachedSignature::from_raw_query(&raw_query).unwrap();
        (raw_query, detached)
    }

    #[test]
    fn redirect_signature_is_verified() {
        let xml = request_xml("", "");
        let (_, detached) = signed_redirect(&XmlSigner::new(Arc::new(sp_credential())), &xml);
        assert!(detached.signed_query.starts_with("SAMLRequest="));
        assert!(!detached.signed_query.contains("Signature="));

        let request = parser()
            .parse(&xml, SamlBinding::HttpRedirect, Some(&detached))
            .unwrap();
        assert!(request.signed);
    }

    #[test]
    fn redirect_signature_mismatch_is_rejected() {
        let xml = request_xml("", "");
        let (_, mut detached) = signed_redirect(&XmlSigner::new(Arc::new(sp_credential())), &xml);
        detached.signed_query = detached.signed_query.replace("relay%20state", "other");
        assert!(matches!(
            parser().parse(&xml, SamlBinding::HttpRedirect, Some(&detached)),
            Err(SamlError::SignatureInvalid(_))
        ));

        let (_, forged) = signed_redirect(&XmlSigner::new(Arc::new(idp_credential())), &xml);
        assert!(matches!(
            parser().parse(&xml, SamlBinding::HttpRedirect, Some(&forged)),
            Err(SamlError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn decoded_parameters_rebuild_the_same_query() {
        let xml = request_xml("", "");
        let signer = XmlSigner::new(Arc::new(sp_credential()));
        let encoded = HttpRedirectBinding::encode_message(&xml).unwrap();
        let (sig_alg, signature) = signer
            .sign_redirect_binding(&encoded, None, SamlMessageType::Request)
            .unwrap();

        let detached = DetachedSignature::from_decoded(&encoded, None, &sig_alg, &signature);
        assert!(parser()
            .parse(&xml, SamlBinding::HttpRedirect, Some(&detached))
            .is_ok());
    }

    #[test]
    fn unsigned_request_rejected_when_signing_wanted() {
        let parser = parser().with_policy(
            SP,
            SignaturePolicy {
                want_authn_requests_signed: true,
                allow_sha1: false,
            },
        );
        assert!(matches!(
            parser.parse(&request_xml("", ""), SamlBinding::HttpPost, None),
            Err(SamlError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn raw_query_without_signature_is_none() {
        assert!(DetachedSignature::from_raw_query("SAMLRequest=abc&RelayState=x").is_none());
    }
}
