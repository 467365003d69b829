//! In-memory registry of SP metadata.

use std::collections::HashMap;
use std::sync::Arc;

use idp_crypto::Certificate;
use parking_lot::RwLock;

use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;

use super::{EntityDescriptor, Endpoint, KeyUsage, ServiceKind};

type Entities = HashMap<String, Arc<EntityDescriptor>>;

/// Known service providers.
///
/// Lookups work on a snapshot; [`MetadataRegistry::load`] builds a complete
/// new map and swaps it in, so readers see either the old or the new set.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entities: RwLock<Arc<Entities>>,
}

impl MetadataRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `descriptors`.
    #[must_use]
    pub fn with_entities(descriptors: impl IntoIterator<Item = EntityDescriptor>) -> Self {
        let registry = Self::new();
        registry.load(descriptors);
        registry
    }

    /// Replaces the registry contents. Later duplicates of an entity ID
    /// win.
    pub fn load(&self, descriptors: impl IntoIterator<Item = EntityDescriptor>) {
        let entities: Entities = descriptors
            .into_iter()
            .map(|d| (d.entity_id.clone(), Arc::new(d)))
            .collect();
        let count = entities.len();
        *self.entities.write() = Arc::new(entities);
        tracing::info!(entities = count, "loaded SP metadata");
    }

    fn snapshot(&self) -> Arc<Entities> {
        Arc::clone(&self.entities.read())
    }

    /// Number of known entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns true if no entity is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Known entity IDs, sorted.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshot().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the descriptor of `entity_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnknownPrincipal`] if the entity is not known.
    pub fn entity_descriptor(&self, entity_id: &str) -> SamlResult<Arc<EntityDescriptor>> {
        self.snapshot()
            .get(entity_id)
            .cloned()
            .ok_or_else(|| SamlError::UnknownPrincipal(entity_id.to_string()))
    }

    /// Picks the binding and location for sending to `entity_id`.
    ///
    /// With an explicit `binding`, the SP must support it. Otherwise the
    /// first binding in [`SamlBinding::RESPONSE_PREFERENCE`] that the SP
    /// supports is used. Within a binding, the `isDefault` endpoint wins,
    /// then the lowest index.
    ///
    /// # Errors
    ///
    /// - [`SamlError::UnknownPrincipal`] if the entity is not known
    /// - [`SamlError::UnsupportedBinding`] if no usable binding exists
    pub fn endpoint_for(
        &self,
        entity_id: &str,
        service: ServiceKind,
        binding: Option<SamlBinding>,
    ) -> SamlResult<(SamlBinding, String)> {
        let descriptor = self.entity_descriptor(entity_id)?;
        let candidates: &[SamlBinding] = match &binding {
            Some(b) => std::slice::from_ref(b),
            None => &SamlBinding::RESPONSE_PREFERENCE,
        };

        for &candidate in candidates {
            if let Some(endpoint) = preferred_endpoint(&descriptor, service, candidate) {
                return Ok((candidate, endpoint.location.clone()));
            }
        }

        Err(SamlError::UnsupportedBinding(format!(
            "{entity_id} has no {service:?} endpoint for {}",
            candidates
                .iter()
                .map(SamlBinding::uri)
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Returns the assertion consumer service with `index`.
    ///
    /// # Errors
    ///
    /// [`SamlError::UnknownPrincipal`] for unknown entities and
    /// [`SamlError::InvalidRequest`] if no such index is registered.
    pub fn endpoint_by_index(&self, entity_id: &str, index: u16) -> SamlResult<Endpoint> {
        self.entity_descriptor(entity_id)?
            .endpoints_of(ServiceKind::AssertionConsumer)
            .find(|e| e.index == Some(index))
            .cloned()
            .ok_or_else(|| {
                SamlError::InvalidRequest(format!("{entity_id} has no ACS with index {index}"))
            })
    }

    /// Returns the assertion consumer service at `location`, preferring
    /// the IdP's binding order when the URL is registered more than once.
    ///
    /// # Errors
    ///
    /// [`SamlError::UnknownPrincipal`] for unknown entities and
    /// [`SamlError::InvalidRequest`] if the URL is not registered.
    pub fn endpoint_by_location(&self, entity_id: &str, location: &str) -> SamlResult<Endpoint> {
        let descriptor = self.entity_descriptor(entity_id)?;
        let mut matching: Vec<&Endpoint> = descriptor
            .endpoints_of(ServiceKind::AssertionConsumer)
            .filter(|e| e.location == location)
            .collect();
        matching.sort_by_key(|e| {
            SamlBinding::RESPONSE_PREFERENCE
                .iter()
                .position(|b| *b == e.binding)
                .unwrap_or(usize::MAX)
        });
        matching.first().map(|e| (*e).clone()).ok_or_else(|| {
            SamlError::InvalidRequest(format!(
                "AssertionConsumerServiceURL {location} is not registered for {entity_id}"
            ))
        })
    }

    /// Certificates of `entity_id` usable for `usage`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnknownPrincipal`] if the entity is not known.
    pub fn certs_for(&self, entity_id: &str, usage: KeyUsage) -> SamlResult<Vec<Certificate>> {
        Ok(self
            .entity_descriptor(entity_id)?
            .certificates(usage)
            .cloned()
            .collect())
    }
}

fn preferred_endpoint(
    descriptor: &EntityDescriptor,
    service: ServiceKind,
    binding: SamlBinding,
) -> Option<&Endpoint> {
    descriptor
        .endpoints_of(service)
        .filter(|e| e.binding == binding)
        .min_by_key(|e| (!e.is_default, e.index.unwrap_or(u16::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::test_support::SP_CERT;

    fn registry() -> MetadataRegistry {
        let cert = Certificate::from_pem(SP_CERT).unwrap();
        MetadataRegistry::with_entities([
            EntityDescriptor::new("https://sp.example.com")
                .with_acs(SamlBinding::HttpRedirect, "https://sp.example.com/acs/redirect", 0)
                .with_acs(SamlBinding::HttpPost, "https://sp.example.com/acs/post2", 2)
                .with_acs(SamlBinding::HttpPost, "https://sp.example.com/acs/post", 1)
                .with_key(KeyUsage::Signing, cert),
            EntityDescriptor::new("https://redirect-only.example.com")
                .with_acs(SamlBinding::HttpRedirect, "https://redirect-only.example.com/acs", 0),
            EntityDescriptor::new("https://soap-only.example.com")
                .with_acs(SamlBinding::Soap, "https://soap-only.example.com/acs", 0),
        ])
    }

    #[test]
    fn post_is_preferred() {
        let (binding, location) = registry()
            .endpoint_for("https://sp.example.com", ServiceKind::AssertionConsumer, None)
            .unwrap();
        assert_eq!(binding, SamlBinding::HttpPost);
        assert_eq!(location, "https://sp.example.com/acs/post");
    }

    #[test]
    fn falls_back_to_redirect() {
        let (binding, _) = registry()
            .endpoint_for(
                "https://redirect-only.example.com",
                ServiceKind::AssertionConsumer,
                None,
            )
            .unwrap();
        assert_eq!(binding, SamlBinding::HttpRedirect);
    }

    #[test]
    fn explicit_binding_must_be_supported() {
        let registry = registry();
        let (binding, _) = registry
            .endpoint_for(
                "https://sp.example.com",
                ServiceKind::AssertionConsumer,
                Some(SamlBinding::HttpRedirect),
            )
            .unwrap();
        assert_eq!(binding, SamlBinding::HttpRedirect);

        let result = registry.endpoint_for(
            "https://redirect-only.example.com",
            ServiceKind::AssertionConsumer,
            Some(SamlBinding::HttpPost),
        );
        assert!(matches!(result, Err(SamlError::UnsupportedBinding(_))));
    }

    #[test]
    fn unknown_entity_is_unknown_principal() {
        let result = registry().endpoint_for(
            "https://nobody.example.com",
            ServiceKind::AssertionConsumer,
            None,
        );
        assert!(matches!(result, Err(SamlError::UnknownPrincipal(ref id)) if id == "https://nobody.example.com"));
    }

    #[test]
    fn no_common_binding_is_unsupported() {
        let result = registry().endpoint_for(
            "https://soap-only.example.com",
            ServiceKind::AssertionConsumer,
            None,
        );
        assert!(matches!(result, Err(SamlError::UnsupportedBinding(_))));
    }

    #[test]
    fn lookups_by_index_and_location() {
        let registry = registry();
        let endpoint = registry.endpoint_by_index("https://sp.example.com", 2).unwrap();
        assert_eq!(endpoint.location, "https://sp.example.com/acs/post2");
        assert!(registry.endpoint_by_index("https://sp.example.com", 9).is_err());

        let endpoint = registry
            .endpoint_by_location("https://sp.example.com", "https://sp.example.com/acs/redirect")
            .unwrap();
        assert_eq!(endpoint.binding, SamlBinding::HttpRedirect);
        assert!(matches!(
            registry.endpoint_by_location("https://sp.example.com", "https://evil.example.com/"),
            Err(SamlError::InvalidRequest(_))
        ));
    }

    #[test]
    fn certs_by_usage() {
        let registry = registry();
        assert_eq!(registry.certs_for("https://sp.example.com", KeyUsage::Signing).unwrap().len(), 1);
        assert!(registry
            .certs_for("https://sp.example.com", KeyUsage::Encryption)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn load_replaces_everything() {
        let registry = registry();
        assert_eq!(registry.len(), 3);

        let before = registry.entity_descriptor("https://sp.example.com").unwrap();
        registry.load([EntityDescriptor::new("https://new.example.com")]);
        registry.load([EntityDescriptor::new("https://new.example.com")]);

        assert_eq!(registry.entity_ids(), vec!["https://new.example.com".to_string()]);
        assert!(registry.entity_descriptor("https://sp.example.com").is_err());
        // previously handed out descriptors stay intact
        assert_eq!(before.endpoints.len(), 3);
    }
}
