//! XML Signature validation.
//!
//! Validates enveloped signatures on parsed documents and detached
//! redirect-binding signatures against a set of trusted certificates.

use std::collections::HashSet;

use base64::Engine;
use idp_crypto::Certificate;

use crate::error::{SamlError, SamlResult};
use crate::types::{transforms, XMLDSIG_NS};
use crate::xml::{self, Element, Node, NsDecl};

use super::c14n::{canonicalize_with, parse_prefix_list};
use super::{HashAlgorithm, SignatureAlgorithm, XmlSignature};

/// XML signature validator.
#[derive(Debug, Clone)]
pub struct XmlSignatureValidator {
    trusted_certificates: Vec<Certificate>,
    allow_sha1: bool,
}

impl XmlSignatureValidator {
    /// Creates a validator trusting the given certificates.
    #[must_use]
    pub fn new(trusted_certificates: Vec<Certificate>) -> Self {
        Self {
            trusted_certificates,
            allow_sha1: false,
        }
    }

    /// Allows SHA-1 based signatures.
    #[must_use]
    pub const fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    /// Validates the enveloped signature on the root element of `xml`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] if the signature is missing,
    /// malformed, does not reference the root, or does not verify.
    pub fn validate(&self, xml: &str) -> SamlResult<XmlSignature> {
        let root = xml::parse(xml)?;
        self.validate_element(&root, &root)
    }

    /// Validates the enveloped signature that is a direct child of `element`.
    ///
    /// `root` is the whole document and is used to reject duplicate IDs,
    /// which would make the reference ambiguous.
    ///
    /// # Errors
    ///
    /// See [`XmlSignatureValidator::validate`].
    pub fn validate_element(&self, root: &Element, element: &Element) -> SamlResult<XmlSignature> {
        ensure_unique_ids(root)?;

        let signature_el = element
            .child(XMLDSIG_NS, "Signature")
            .ok_or_else(|| SamlError::SignatureInvalid("no enveloped signature".to_string()))?;
        let signed_info = signature_el
            .child(XMLDSIG_NS, "SignedInfo")
            .ok_or_else(|| SamlError::SignatureInvalid("missing SignedInfo".to_string()))?;
        let signature = extract_signature(signature_el, signed_info)?;

        if signature.algorithm.is_deprecated() && !self.allow_sha1 {
            return Err(SamlError::SignatureInvalid(
                "SHA-1 signatures are not allowed".to_string(),
            ));
        }
        if signature.digest_algorithm.is_deprecated() && !self.allow_sha1 {
            return Err(SamlError::SignatureInvalid("SHA-1 digests are not allowed".to_string()));
        }

        let element_id = element
            .id()
            .ok_or_else(|| SamlError::SignatureInvalid("signed element has no ID".to_string()))?;
        if signature.reference_id() != element_id {
            return Err(SamlError::SignatureInvalid(format!(
                "reference '{}' does not point at the signed element '{element_id}'",
                signature.reference_uri
            )));
        }

        let mut context: Vec<NsDecl> = root
            .ancestors_of(element)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|e| e.namespaces.iter().cloned())
            .collect();
        self.verify_digest(element, &signature, &context)?;

        context.extend(element.namespaces.iter().cloned());
        context.extend(signature_el.namespaces.iter().cloned());
        let signed_info_prefixes = signed_info
            .child(XMLDSIG_NS, "CanonicalizationMethod")
            .map(inclusive_prefixes)
            .unwrap_or_default();
        let signature_bytes = decode_b64(&signature.signature_value)?;
        let canonical_signed_info = canonicalize_with(signed_info, &signed_info_prefixes, &context);
        self.verify_with_trusted(canonical_signed_info.as_bytes(), &signature_bytes, signature.algorithm)?;

        Ok(signature)
    }

    /// Validates a detached signature for HTTP-Redirect binding.
    ///
    /// `signed_query` is the exact octet string the sender signed.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] if the algorithm is unknown or
    /// disallowed, or if no trusted certificate verifies the signature.
    pub fn validate_redirect_binding(
        &self,
        signed_query: &str,
        signature_b64: &str,
        sig_alg: &str,
    ) -> SamlResult<()> {
        let algorithm = SignatureAlgorithm::from_uri(sig_alg).ok_or_else(|| {
            SamlError::SignatureInvalid(format!("unknown signature algorithm: {sig_alg}"))
        })?;

        if algorithm.is_deprecated() && !self.allow_sha1 {
            return Err(SamlError::SignatureInvalid(
                "SHA-1 signatures are not allowed".to_string(),
            ));
        }

        let signature = decode_b64(signature_b64)?;
        self.verify_with_trusted(signed_query.as_bytes(), &signature, algorithm)
    }

    /// Recomputes the reference digest over `element` minus its signature.
    /// `context` holds the declarations made above `element`.
    fn verify_digest(
        &self,
        element: &Element,
        signature: &XmlSignature,
        context: &[NsDecl],
    ) -> SamlResult<()> {
        let mut stripped = element.clone();
        let position = stripped
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.is(XMLDSIG_NS, "Signature")));
        if let Some(i) = position {
            stripped.children.remove(i);
        }

        let canonical = canonicalize_with(&stripped, &signature.inclusive_prefixes, context);
        let computed = idp_crypto::hash(signature.digest_algorithm, canonical.as_bytes());
        let expected = decode_b64(&signature.digest_value)?;

        if computed != expected {
            return Err(SamlError::SignatureInvalid("digest mismatch".to_string()));
        }
        Ok(())
    }

    fn verify_with_trusted(
        &self,
        data: &[u8],
        signature: &[u8],
        algorithm: SignatureAlgorithm,
    ) -> SamlResult<()> {
        if self.trusted_certificates.is_empty() {
            return Err(SamlError::SignatureInvalid(
                "no trusted certificates configured".to_string(),
            ));
        }
        for cert in &self.trusted_certificates {
            if cert.verify(algorithm, data, signature)? {
                return Ok(());
            }
        }
        Err(SamlError::SignatureInvalid(
            "signature verification failed with all trusted certificates".to_string(),
        ))
    }
}

/// Returns true if `element` carries an enveloped `<ds:Signature>` child.
#[must_use]
pub fn has_enveloped_signature(element: &Element) -> bool {
    element.child(XMLDSIG_NS, "Signature").is_some()
}

fn ensure_unique_ids(root: &Element) -> SamlResult<()> {
    let mut seen = HashSet::new();
    for id in root.all_ids() {
        if !seen.insert(id) {
            return Err(SamlError::SignatureInvalid(format!("duplicate ID '{id}'")));
        }
    }
    Ok(())
}

fn extract_signature(signature_el: &Element, signed_info: &Element) -> SamlResult<XmlSignature> {
    let algorithm_attr = |parent: &Element, name: &str| -> SamlResult<String> {
        parent
            .child(XMLDSIG_NS, name)
            .and_then(|e| e.attr("Algorithm"))
            .map(String::from)
            .ok_or_else(|| SamlError::SignatureInvalid(format!("missing {name}")))
    };

    let c14n = algorithm_attr(signed_info, "CanonicalizationMethod")?;
    if c14n != transforms::EXCLUSIVE_C14N {
        return Err(SamlError::SignatureInvalid(format!(
            "unsupported canonicalization: {c14n}"
        )));
    }

    let sig_method = algorithm_attr(signed_info, "SignatureMethod")?;
    let algorithm = SignatureAlgorithm::from_uri(&sig_method).ok_or_else(|| {
        SamlError::SignatureInvalid(format!("unknown signature algorithm: {sig_method}"))
    })?;

    let mut references = signed_info.children_named(XMLDSIG_NS, "Reference");
    let reference = references
        .next()
        .ok_or_else(|| SamlError::SignatureInvalid("missing Reference".to_string()))?;
    if references.next().is_some() {
        return Err(SamlError::SignatureInvalid("multiple References".to_string()));
    }

    let mut prefixes = Vec::new();
    if let Some(transforms_el) = reference.child(XMLDSIG_NS, "Transforms") {
        for transform in transforms_el.children_named(XMLDSIG_NS, "Transform") {
            match transform.attr("Algorithm") {
                Some(transforms::ENVELOPED_SIGNATURE) => {}
                Some(transforms::EXCLUSIVE_C14N) => prefixes = inclusive_prefixes(transform),
                other => {
                    return Err(SamlError::SignatureInvalid(format!(
                        "unsupported transform: {}",
                        other.unwrap_or("<none>")
                    )));
                }
            }
        }
    }

    let digest_method = algorithm_attr(reference, "DigestMethod")?;
    let digest_algorithm = HashAlgorithm::from_uri(&digest_method).ok_or_else(|| {
        SamlError::SignatureInvalid(format!("unknown digest algorithm: {digest_method}"))
    })?;

    let digest_value = reference
        .child(XMLDSIG_NS, "DigestValue")
        .map(|e| compact(&e.text()))
        .ok_or_else(|| SamlError::SignatureInvalid("missing DigestValue".to_string()))?;
    let signature_value = signature_el
        .child(XMLDSIG_NS, "SignatureValue")
        .map(|e| compact(&e.text()))
        .ok_or_else(|| SamlError::SignatureInvalid("missing SignatureValue".to_string()))?;

    let x509_certificate = signature_el
        .child(XMLDSIG_NS, "KeyInfo")
        .and_then(|k| k.child(XMLDSIG_NS, "X509Data"))
        .and_then(|d| d.child(XMLDSIG_NS, "X509Certificate"))
        .map(|c| compact(&c.text()));

    Ok(XmlSignature {
        algorithm,
        digest_algorithm,
        reference_uri: reference.attr("URI").unwrap_or_default().to_string(),
        inclusive_prefixes: prefixes,
        digest_value,
        signature_value,
        x509_certificate,
    })
}

/// Reads `<ec:InclusiveNamespaces PrefixList>` under a C14N method or
/// transform.
fn inclusive_prefixes(method: &Element) -> Vec<String> {
    method
        .child(transforms::EXCLUSIVE_C14N, "InclusiveNamespaces")
        .and_then(|e| e.attr("PrefixList"))
        .map(parse_prefix_list)
        .unwrap_or_default()
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn decode_b64(text: &str) -> SamlResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(compact(text))
        .map_err(|e| SamlError::SignatureInvalid(format!("invalid base64: {e}")))
}
