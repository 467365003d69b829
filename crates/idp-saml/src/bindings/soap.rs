//! SOAP binding (SOAP 1.1 envelopes).

use std::collections::HashSet;

use crate::error::{SamlError, SamlResult};
use crate::types::{SOAP_ENV_NS, XSI_NS};
use crate::xml::{self, Element, NsDecl};

use super::SamlMessageType;

/// SOAP binding encoder/decoder.
pub struct SoapBinding;

impl SoapBinding {
    /// Wraps a SAML message in a SOAP envelope.
    #[must_use]
    pub fn wrap(xml: &str) -> String {
        let body = strip_xml_declaration(xml);
        format!(
            r#"<soap-env:Envelope xmlns:soap-env="{SOAP_ENV_NS}"><soap-env:Body>{body}</soap-env:Body></soap-env:Envelope>"#
        )
    }

    /// Extracts the SAML message from a SOAP envelope.
    ///
    /// The first element inside `Body` is returned as a standalone
    /// document. Declarations from `Envelope` or `Body` are copied onto it
    /// for the prefixes it uses, so that it still parses on its own.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MalformedBinding`] if the envelope is not a SOAP
    /// envelope or its body does not hold a message of `message_type`.
    pub fn unwrap(envelope_xml: &str, message_type: SamlMessageType) -> SamlResult<String> {
        let envelope = xml::parse(envelope_xml)?;
        if !envelope.is(SOAP_ENV_NS, "Envelope") {
            return Err(SamlError::MalformedBinding(format!(
                "expected SOAP Envelope, found {}",
                envelope.qname()
            )));
        }
        let body = envelope
            .child(SOAP_ENV_NS, "Body")
            .ok_or_else(|| SamlError::MalformedBinding("SOAP envelope has no Body".to_string()))?;
        let message = body
            .elements()
            .next()
            .ok_or_else(|| SamlError::MalformedBinding("SOAP Body is empty".to_string()))?;

        if !accepts(message_type, &message.local_name) {
            return Err(SamlError::MalformedBinding(format!(
                "SOAP Body holds {}, not a SAML {}",
                message.local_name,
                message_type.as_str()
            )));
        }

        let used = used_prefixes(message);
        let mut extracted = message.clone();
        for decl in body.namespaces.iter().chain(&envelope.namespaces) {
            if used.contains(&decl.prefix) {
                inherit(&mut extracted, decl);
            }
        }
        Ok(extracted.to_xml())
    }
}

fn accepts(message_type: SamlMessageType, local_name: &str) -> bool {
    match message_type {
        SamlMessageType::Request => {
            local_name.ends_with("Request")
                || local_name.ends_with("Query")
                || local_name == "ArtifactResolve"
        }
        SamlMessageType::Response => local_name.ends_with("Response"),
    }
}

/// Prefixes named anywhere in the subtree: element and attribute names,
/// plus the QName in `xsi:type` values. `None` stands for the default
/// namespace.
fn used_prefixes(message: &Element) -> HashSet<Option<String>> {
    let mut used = HashSet::new();
    for element in message.descendants() {
        used.insert(element.prefix.clone());
        for attr in &element.attributes {
            if attr.prefix.is_some() {
                used.insert(attr.prefix.clone());
            }
            if attr.namespace.as_deref() == Some(XSI_NS) && attr.local_name == "type" {
                let prefix = attr.value.split_once(':').map(|(p, _)| p.to_string());
                used.insert(prefix);
            }
        }
    }
    used
}

/// Adds `decl` unless the element already binds that prefix. Inner scopes
/// are visited first, so the nearest binding wins.
fn inherit(element: &mut Element, decl: &NsDecl) {
    if element.namespaces.iter().any(|d| d.prefix == decl.prefix) {
        return;
    }
    element.namespaces.push(decl.clone());
}

fn strip_xml_declaration(xml: &str) -> &str {
    let trimmed = xml.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}
