//! XML Signature creation.
//!
//! Signs SAML documents with enveloped signatures and builds detached
//! signatures for the HTTP-Redirect binding.

use std::sync::Arc;

use base64::Engine;

use crate::bindings::SamlMessageType;
use crate::error::{SamlError, SamlResult};
use crate::types::{transforms, SAML_NS, XMLDSIG_NS};
use crate::xml::{self, Element};

use super::c14n::canonicalize;
use super::{SignatureConfig, SigningCredential};

/// XML document signer.
///
/// Any failure here is fatal for the response being built; callers never
/// fall back to sending the document unsigned.
#[derive(Debug, Clone)]
pub struct XmlSigner {
    credential: Arc<SigningCredential>,
    config: SignatureConfig,
}

impl XmlSigner {
    /// Creates a signer with the default configuration (RSA-SHA256).
    #[must_use]
    pub fn new(credential: Arc<SigningCredential>) -> Self {
        Self {
            credential,
            config: SignatureConfig::default(),
        }
    }

    /// Sets the signature configuration.
    #[must_use]
    pub fn with_config(mut self, config: SignatureConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the signature configuration.
    #[must_use]
    pub fn config(&self) -> SignatureConfig {
        self.config
    }

    /// Signs the element with ID `reference_id` inside `xml` and returns the
    /// serialized document with a `<ds:Signature>` inserted after the
    /// element's `<saml:Issuer>`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ResponseConstructionError`] if the document does
    /// not parse, the ID is absent, or the signing operation fails.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let mut root = xml::parse(xml)
            .map_err(|e| SamlError::ResponseConstructionError(format!("cannot sign: {e}")))?;
        self.sign_element(&mut root, reference_id)?;
        Ok(root.to_xml())
    }

    /// Signs the element with ID `reference_id` in place.
    ///
    /// # Errors
    ///
    /// See [`XmlSigner::sign`].
    pub fn sign_element(&self, root: &mut Element, reference_id: &str) -> SamlResult<()> {
        let target = root.find_by_id_mut(reference_id).ok_or_else(|| {
            SamlError::ResponseConstructionError(format!("element with ID '{reference_id}' not found"))
        })?;

        let digest = idp_crypto::hash(self.config.digest, canonicalize(target).as_bytes());
        let digest_b64 = base64::engine::general_purpose::STANDARD.encode(digest);

        let signed_info = self.build_signed_info(reference_id, &digest_b64);
        let signature_value = self
            .credential
            .key()
            .sign(self.config.algorithm, canonicalize(&signed_info).as_bytes())
            .map_err(|e| SamlError::ResponseConstructionError(format!("signing failed: {e}")))?;
        let signature_b64 = base64::engine::general_purpose::STANDARD.encode(signature_value);

        let signature = self.build_signature_element(signed_info, &signature_b64);
        insert_signature(target, signature);

        tracing::debug!(
            reference = %reference_id,
            algorithm = %self.config.algorithm.uri(),
            "signed XML element"
        );
        Ok(())
    }

    /// Creates a detached signature for the HTTP-Redirect binding.
    ///
    /// `encoded_message` is the deflated, base64-encoded message. Returns the
    /// `SigAlg` URI and the base64 `Signature` parameter.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ResponseConstructionError`] if signing fails.
    pub fn sign_redirect_binding(
        &self,
        encoded_message: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> SamlResult<(String, String)> {
        let sig_alg = self.config.algorithm.uri();
        let to_sign = redirect_signed_query(message_type, encoded_message, relay_state, sig_alg);

        let signature = self
            .credential
            .key()
            .sign(self.config.algorithm, to_sign.as_bytes())
            .map_err(|e| SamlError::ResponseConstructionError(format!("signing failed: {e}")))?;

        Ok((
            sig_alg.to_string(),
            base64::engine::general_purpose::STANDARD.encode(signature),
        ))
    }

    fn build_signed_info(&self, reference_id: &str, digest_b64: &str) -> Element {
        let mut signed_info = ds("SignedInfo");

        let mut c14n_method = ds("CanonicalizationMethod");
        c14n_method.set_attr("Algorithm", transforms::EXCLUSIVE_C14N);
        signed_info.push(c14n_method);

        let mut sig_method = ds("SignatureMethod");
        sig_method.set_attr("Algorithm", self.config.algorithm.uri());
        signed_info.push(sig_method);

        let mut reference = ds("Reference");
        reference.set_attr("URI", format!("#{reference_id}"));

        let mut transforms_el = ds("Transforms");
        for algorithm in [transforms::ENVELOPED_SIGNATURE, transforms::EXCLUSIVE_C14N] {
            let mut transform = ds("Transform");
            transform.set_attr("Algorithm", algorithm);
            transforms_el.push(transform);
        }
        reference.push(transforms_el);

        let mut digest_method = ds("DigestMethod");
        digest_method.set_attr("Algorithm", self.config.digest.uri());
        reference.push(digest_method);

        let mut digest_value = ds("DigestValue");
        digest_value.push_text(digest_b64);
        reference.push(digest_value);

        signed_info.push(reference);
        signed_info
    }

    fn build_signature_element(&self, signed_info: Element, signature_b64: &str) -> Element {
        let mut signature = ds("Signature");
        signature.declare(Some("ds"), XMLDSIG_NS);
        signature.push(signed_info);

        let mut value = ds("SignatureValue");
        value.push_text(signature_b64);
        signature.push(value);

        let mut cert = ds("X509Certificate");
        cert.push_text(self.credential.certificate().to_base64());
        let mut x509_data = ds("X509Data");
        x509_data.push(cert);
        let mut key_info = ds("KeyInfo");
        key_info.push(x509_data);
        signature.push(key_info);

        signature
    }
}

/// Builds the octet string covered by a redirect-binding signature.
///
/// Parameters keep the order `SAMLRequest|SAMLResponse`, `RelayState`,
/// `SigAlg`, each URL-encoded.
#[must_use]
pub fn redirect_signed_query(
    message_type: SamlMessageType,
    encoded_message: &str,
    relay_state: Option<&str>,
    sig_alg: &str,
) -> String {
    let mut query = format!(
        "{}={}",
        message_type.form_param(),
        urlencoding::encode(encoded_message)
    );
    if let Some(rs) = relay_state {
        query.push_str("&RelayState=");
        query.push_str(&urlencoding::encode(rs));
    }
    query.push_str("&SigAlg=");
    query.push_str(&urlencoding::encode(sig_alg));
    query
}

/// Removes the `<ds:Signature>` enveloped in the root element of `xml`.
///
/// Messages sent over HTTP-Redirect carry their signature in the query
/// string instead. Signatures on nested elements stay.
///
/// # Errors
///
/// Returns [`SamlError::ResponseConstructionError`] if `xml` does not parse.
pub fn strip_enveloped_signature(xml: &str) -> SamlResult<String> {
    let mut root = xml::parse(xml)
        .map_err(|e| SamlError::ResponseConstructionError(format!("cannot strip signature: {e}")))?;
    root.children
        .retain(|n| !matches!(n, xml::Node::Element(e) if e.is(XMLDSIG_NS, "Signature")));
    Ok(root.to_xml())
}

fn ds(local_name: &str) -> Element {
    Element::new(Some("ds"), local_name, Some(XMLDSIG_NS))
}

/// Inserts the signature right after the `Issuer` child, or first if the
/// element has no issuer.
fn insert_signature(target: &mut Element, signature: Element) {
    let position = target
        .children
        .iter()
        .position(|n| matches!(n, xml::Node::Element(e) if e.is(SAML_NS, "Issuer")))
        .map_or(0, |i| i + 1);
    target.children.insert(position, xml::Node::Element(signature));
}
