//! SP entity descriptors and their parsing.

use std::path::Path;

use idp_crypto::Certificate;

use crate::error::{SamlError, SamlResult};
use crate::types::{SamlBinding, MD_NS, XMLDSIG_NS};
use crate::xml::{self, Element};

/// Kind of SP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// `AssertionConsumerService`.
    AssertionConsumer,
}

impl ServiceKind {
    const fn element_name(self) -> &'static str {
        match self {
            Self::AssertionConsumer => "AssertionConsumerService",
        }
    }
}

/// One SP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Which service the endpoint belongs to.
    pub service: ServiceKind,
    /// Binding accepted at the location.
    pub binding: SamlBinding,
    /// Endpoint URL.
    pub location: String,
    /// `index`, for indexed endpoints.
    pub index: Option<u16>,
    /// `isDefault="true"`.
    pub is_default: bool,
}

/// `use` attribute of a `KeyDescriptor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    /// Signing keys.
    Signing,
    /// Encryption keys.
    Encryption,
    /// No `use` attribute: valid for both.
    Unspecified,
}

impl KeyUsage {
    fn from_attr(value: Option<&str>) -> SamlResult<Self> {
        match value {
            None => Ok(Self::Unspecified),
            Some("signing") => Ok(Self::Signing),
            Some("encryption") => Ok(Self::Encryption),
            Some(other) => Err(SamlError::ConfigurationError(format!(
                "unknown KeyDescriptor use '{other}'"
            ))),
        }
    }

    /// Whether a key declared with `self` may be used for `wanted`.
    #[must_use]
    pub fn covers(self, wanted: Self) -> bool {
        self == Self::Unspecified || self == wanted
    }
}

/// A certificate published by an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    /// Declared usage.
    pub usage: KeyUsage,
    /// The certificate.
    pub certificate: Certificate,
}

/// Parsed metadata of one service provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// `entityID`.
    pub entity_id: String,
    /// Endpoints in document order.
    pub endpoints: Vec<Endpoint>,
    /// Published certificates.
    pub keys: Vec<KeyDescriptor>,
    /// `AuthnRequestsSigned="true"` on the SP descriptor.
    pub authn_requests_signed: bool,
    /// NameID formats the SP declares.
    pub name_id_formats: Vec<String>,
}

impl EntityDescriptor {
    /// Creates a descriptor with no endpoints or keys.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            endpoints: Vec::new(),
            keys: Vec::new(),
            authn_requests_signed: false,
            name_id_formats: Vec::new(),
        }
    }

    /// Adds an assertion consumer service.
    #[must_use]
    pub fn with_acs(mut self, binding: SamlBinding, location: impl Into<String>, index: u16) -> Self {
        self.endpoints.push(Endpoint {
            service: ServiceKind::AssertionConsumer,
            binding,
            location: location.into(),
            index: Some(index),
            is_default: false,
        });
        self
    }

    /// Adds a certificate.
    #[must_use]
    pub fn with_key(mut self, usage: KeyUsage, certificate: Certificate) -> Self {
        self.keys.push(KeyDescriptor { usage, certificate });
        self
    }

    /// Endpoints of one service kind.
    pub fn endpoints_of(&self, service: ServiceKind) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter().filter(move |e| e.service == service)
    }

    /// Certificates usable for `usage`.
    pub fn certificates(&self, usage: KeyUsage) -> impl Iterator<Item = &Certificate> {
        self.keys
            .iter()
            .filter(move |k| k.usage.covers(usage))
            .map(|k| &k.certificate)
    }

    /// Parses an `EntityDescriptor` or every SP in an `EntitiesDescriptor`.
    ///
    /// Entities without an `SPSSODescriptor` are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] for malformed XML and
    /// [`SamlError::ConfigurationError`] for invalid metadata content.
    pub fn from_xml(xml: &str) -> SamlResult<Vec<Self>> {
        let root = xml::parse(xml)?;
        let entities: Vec<&Element> = if root.is(MD_NS, "EntityDescriptor") {
            vec![&root]
        } else if root.is(MD_NS, "EntitiesDescriptor") {
            root.descendants()
                .into_iter()
                .filter(|e| e.is(MD_NS, "EntityDescriptor"))
                .collect()
        } else {
            return Err(SamlError::ConfigurationError(format!(
                "expected metadata, found {}",
                root.qname()
            )));
        };

        let mut out = Vec::new();
        for entity in entities {
            if let Some(descriptor) = Self::from_element(entity)? {
                out.push(descriptor);
            }
        }
        Ok(out)
    }

    /// Reads and parses a metadata file.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] if the file cannot be read,
    /// otherwise see [`EntityDescriptor::from_xml`].
    pub fn from_file(path: &Path) -> SamlResult<Vec<Self>> {
        let xml = std::fs::read_to_string(path).map_err(|e| {
            SamlError::ConfigurationError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_xml(&xml)
    }

    fn from_element(entity: &Element) -> SamlResult<Option<Self>> {
        let entity_id = entity
            .attr("entityID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SamlError::ConfigurationError("EntityDescriptor without entityID".to_string()))?;

        let Some(sp) = entity.child(MD_NS, "SPSSODescriptor") else {
            tracing::debug!(entity_id, "skipping entity without SPSSODescriptor");
            return Ok(None);
        };

        let mut descriptor = Self::new(entity_id);
        descriptor.authn_requests_signed = sp.attr("AuthnRequestsSigned") == Some("true");

        let service = ServiceKind::AssertionConsumer;
        for el in sp.children_named(MD_NS, service.element_name()) {
            if let Some(endpoint) = parse_endpoint(el, service, entity_id)? {
                descriptor.endpoints.push(endpoint);
            }
        }

        for key in sp.children_named(MD_NS, "KeyDescriptor") {
            let usage = KeyUsage::from_attr(key.attr("use"))?;
            for cert in key
                .descendants()
                .into_iter()
                .filter(|e| e.is(XMLDSIG_NS, "X509Certificate"))
            {
                let certificate = Certificate::from_base64(&cert.text()).map_err(|e| {
                    SamlError::ConfigurationError(format!("{entity_id}: bad certificate: {e}"))
                })?;
                descriptor.keys.push(KeyDescriptor { usage, certificate });
            }
        }

        descriptor.name_id_formats = sp
            .children_named(MD_NS, "NameIDFormat")
            .map(|e| e.text().trim().to_string())
            .collect();

        Ok(Some(descriptor))
    }
}

fn parse_endpoint(el: &Element, service: ServiceKind, entity_id: &str) -> SamlResult<Option<Endpoint>> {
    let binding_uri = el.attr("Binding").unwrap_or_default();
    let Some(binding) = SamlBinding::from_uri(binding_uri) else {
        tracing::debug!(entity_id, binding = binding_uri, "ignoring endpoint with unsupported binding");
        return Ok(None);
    };
    let location = el
        .attr("Location")
        .filter(|l| !l.is_empty())
        .ok_or_else(|| SamlError::ConfigurationError(format!("{entity_id}: endpoint without Location")))?;
    let index = el
        .attr("index")
        .map(str::parse::<u16>)
        .transpose()
        .map_err(|e| SamlError::ConfigurationError(format!("{entity_id}: bad endpoint index: {e}")))?;

    Ok(Some(Endpoint {
        service,
        binding,
        location: location.to_string(),
        index,
        is_default: el.attr("isDefault") == Some("true"),
    }))
}
