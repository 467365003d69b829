//! The IdP's own metadata document.

use idp_crypto::Certificate;

use crate::types::{SamlBinding, MD_NS, SAMLP_NS, XMLDSIG_NS};
use crate::xml::escape_attr;

/// Values published in the IdP's `EntityDescriptor`.
#[derive(Debug, Clone)]
pub struct IdpMetadata {
    /// IdP entity ID.
    pub entity_id: String,
    /// Single sign-on URL, served for both front-channel bindings.
    pub sso_location: String,
    /// Signing certificate.
    pub certificate: Certificate,
    /// NameID format URIs the IdP can issue.
    pub name_id_formats: Vec<String>,
    /// `WantAuthnRequestsSigned`.
    pub want_authn_requests_signed: bool,
}

impl IdpMetadata {
    /// Renders the metadata XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let name_id_formats: String = self
            .name_id_formats
            .iter()
            .map(|f| format!("\n        <md:NameIDFormat>{}</md:NameIDFormat>", crate::xml::escape_text(f)))
            .collect();
        let sso_services: String = [SamlBinding::HttpPost, SamlBinding::HttpRedirect]
            .iter()
            .map(|b| {
                format!(
                    "\n        <md:SingleSignOnService Binding=\"{}\" Location=\"{}\"/>",
                    b.uri(),
                    escape_attr(&self.sso_location)
                )
            })
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="{MD_NS}" xmlns:ds="{XMLDSIG_NS}" entityID="{}">
    <md:IDPSSODescriptor WantAuthnRequestsSigned="{}" protocolSupportEnumeration="{SAMLP_NS}">
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo>
                <ds:X509Data>
                    <ds:X509Certificate>{}</ds:X509Certificate>
                </ds:X509Data>
            </ds:KeyInfo>
        </md:KeyDescriptor>{}{}
    </md:IDPSSODescriptor>
</md:EntityDescriptor>
"#,
            escape_attr(&self.entity_id),
            self.want_authn_requests_signed,
            self.certificate.to_base64(),
            name_id_formats,
            sso_services,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::test_support::IDP_CERT;
    use crate::types::NameIdFormat;
    use crate::xml;

    #[test]
    fn metadata_describes_the_idp() {
        let metadata = IdpMetadata {
            entity_id: "https://idp.example.com/metadata".to_string(),
            sso_location: "https://idp.example.com/sso?a=1&b=2".to_string(),
            certificate: Certificate::from_pem(IDP_CERT).unwrap(),
            name_id_formats: vec![NameIdFormat::Unspecified.uri().to_string()],
            want_authn_requests_signed: false,
        };

        let root = xml::parse(&metadata.to_xml()).unwrap();
        assert!(root.is(MD_NS, "EntityDescriptor"));
        assert_eq!(root.attr("entityID"), Some("https://idp.example.com/metadata"));

        let idp = root.child(MD_NS, "IDPSSODescriptor").unwrap();
        let sso: Vec<_> = idp.children_named(MD_NS, "SingleSignOnService").collect();
        assert_eq!(sso.len(), 2);
        assert_eq!(sso[0].attr("Binding"), Some(SamlBinding::HttpPost.uri()));
        assert_eq!(sso[1].attr("Location"), Some("https://idp.example.com/sso?a=1&b=2"));

        let cert = idp
            .descendants()
            .into_iter()
            .find(|e| e.is(XMLDSIG_NS, "X509Certificate"))
            .unwrap();
        assert_eq!(
            Certificate::from_base64(&cert.text()).unwrap(),
            metadata.certificate
        );
    }
}
