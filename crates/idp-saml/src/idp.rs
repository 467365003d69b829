//! The identity provider.
//!
//! [`IdentityProvider`] ties the pieces together for one login exchange:
//! decode and validate the request, pick where the answer goes, check
//! access, map the identity, build and sign the response, and bind it for
//! the browser.
//!
//! # Usage
//!
//! ```rust,ignore
//! use idp_saml::identity::ProcessorRegistry;
//! use idp_saml::idp::IdentityProvider;
//!
//! let idp = IdentityProvider::from_config(config, &ProcessorRegistry::default())?;
//!
//! let request = idp.parse_authn_request(&saml_request, SamlBinding::HttpRedirect, detached.as_ref())?;
//! let issued = match principal {
//!     Some(user) => idp.authenticate(&request, user.as_ref())?,
//!     None if request.is_passive => idp.passive_failure(&request)?,
//!     None => return redirect_to_login(),
//! };
//! let outbound = idp.bind(&issued, relay_state.as_deref())?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;

use crate::bindings::{self, OutboundMessage, SamlMessageType};
use crate::config::{IdpConfig, SpConfig};
use crate::error::{SamlError, SamlResult};
use crate::identity::{Principal, Processor, ProcessorRegistry};
use crate::metadata::{IdpMetadata, MetadataRegistry, ServiceKind};
use crate::request::{DetachedSignature, RequestParser};
use crate::response::{resolve_name_id, ResponseBuilder, SignFlags};
use crate::signature::{strip_enveloped_signature, SignatureConfig, SigningCredential, XmlSigner};
use crate::types::{AuthnRequest, NameIdFormat, ResponseArgs, SamlBinding, Status};

/// A response ready to be bound.
#[derive(Debug, Clone)]
pub struct IssuedResponse {
    /// Serialized `<samlp:Response>`.
    pub xml: String,
    /// Where and how it goes.
    pub args: ResponseArgs,
    /// Signing flags used, needed again for redirect signatures.
    pub sign: SignFlags,
}

/// A SAML 2.0 identity provider.
#[derive(Debug)]
pub struct IdentityProvider {
    config: IdpConfig,
    registry: Arc<MetadataRegistry>,
    parser: RequestParser,
    builder: ResponseBuilder,
    credential: Arc<SigningCredential>,
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl IdentityProvider {
    /// Creates an IdP.
    ///
    /// Every SP's processor is resolved here, so an SP naming an
    /// unregistered processor fails at startup.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] for invalid configuration.
    pub fn new(
        config: IdpConfig,
        credential: Arc<SigningCredential>,
        registry: Arc<MetadataRegistry>,
        processor_registry: &ProcessorRegistry,
    ) -> SamlResult<Self> {
        config.validate()?;

        let mut processors = HashMap::new();
        let mut parser = RequestParser::new(Arc::clone(&registry), vec![config.sso_url()]);
        for (entity_id, sp) in &config.service_providers {
            processors.insert(entity_id.clone(), processor_registry.resolve(sp.processor.as_deref())?);
            parser = parser.with_policy(entity_id.clone(), config.signature_policy(sp));
        }

        let signer = XmlSigner::new(Arc::clone(&credential))
            .with_config(SignatureConfig::with_algorithm(config.signature_algorithm));
        let builder = ResponseBuilder::new(&config.entity_id)
            .with_signer(signer)
            .with_validity(Duration::seconds(config.assertion_validity_secs));

        Ok(Self {
            config,
            registry,
            parser,
            builder,
            credential,
            processors,
        })
    }

    /// Loads the credential and SP metadata named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] if anything is unusable.
    pub fn from_config(config: IdpConfig, processor_registry: &ProcessorRegistry) -> SamlResult<Self> {
        let credential = Arc::new(config.signing_credential()?);
        let registry = Arc::new(MetadataRegistry::with_entities(config.load_metadata()?));
        Self::new(config, credential, registry, processor_registry)
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &IdpConfig {
        &self.config
    }

    /// The SP metadata registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    /// Re-reads the SP metadata files and swaps them in.
    ///
    /// # Errors
    ///
    /// On error the previous metadata stays active.
    pub fn reload_metadata(&self) -> SamlResult<()> {
        let descriptors = self.config.load_metadata()?;
        self.registry.load(descriptors);
        Ok(())
    }

    /// Decodes and validates an `AuthnRequest`.
    ///
    /// # Errors
    ///
    /// See [`bindings::decode_with`] and [`RequestParser::parse`].
    pub fn parse_authn_request(
        &self,
        raw: &str,
        binding: SamlBinding,
        detached: Option<&DetachedSignature>,
    ) -> SamlResult<AuthnRequest> {
        let xml = bindings::decode_with(raw, binding, SamlMessageType::Request)?;
        self.parser.parse(&xml, binding, detached)
    }

    /// Works out where the response to `request` goes.
    ///
    /// # Errors
    ///
    /// - [`SamlError::UnknownPrincipal`] for unknown issuers
    /// - [`SamlError::UnsupportedBinding`] when no front-channel binding fits
    pub fn response_args(&self, request: &AuthnRequest) -> SamlResult<ResponseArgs> {
        let issuer = request.issuer.as_str();
        let requested = request.protocol_binding.filter(|b| is_front_channel(*b));

        let (binding, destination) = if let Some(url) = &request.assertion_consumer_service_url {
            let exact = requested.and_then(|b| {
                self.registry
                    .entity_descriptor(issuer)
                    .ok()?
                    .endpoints_of(ServiceKind::AssertionConsumer)
                    .find(|e| e.location == *url && e.binding == b)
                    .cloned()
            });
            let endpoint = match exact {
                Some(endpoint) => endpoint,
                None => self.registry.endpoint_by_location(issuer, url)?,
            };
            (endpoint.binding, endpoint.location)
        } else if let Some(index) = request.assertion_consumer_service_index {
            let endpoint = self.registry.endpoint_by_index(issuer, index)?;
            (endpoint.binding, endpoint.location)
        } else {
            self.registry
                .endpoint_for(issuer, ServiceKind::AssertionConsumer, requested)?
        };

        if !is_front_channel(binding) {
            return Err(SamlError::UnsupportedBinding(format!(
                "cannot answer {issuer} over {binding}"
            )));
        }

        Ok(ResponseArgs {
            sp_entity_id: issuer.to_string(),
            destination,
            binding,
            in_response_to: request.id.clone(),
            name_id_format: request.requested_name_id_format().map(String::from),
        })
    }

    /// Per-SP settings.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] for SPs without settings.
    pub fn sp_config(&self, entity_id: &str) -> SamlResult<&SpConfig> {
        self.config.sp(entity_id)
    }

    fn processor(&self, entity_id: &str) -> SamlResult<&Arc<dyn Processor>> {
        self.processors.get(entity_id).ok_or_else(|| {
            SamlError::ConfigurationError(format!("no processor resolved for SP {entity_id}"))
        })
    }

    /// NameID format for a response: the requested one if the IdP issues
    /// it, else the SP's configured one, else unspecified. The numeric user
    /// id is always sent as unspecified.
    fn name_id_format(&self, args: &ResponseArgs, sp: &SpConfig) -> String {
        if sp.name_id_field.is_none() {
            return NameIdFormat::Unspecified.uri().to_string();
        }
        let requested = args
            .name_id_format
            .as_deref()
            .and_then(NameIdFormat::from_uri)
            .filter(|f| self.config.name_id_formats.contains(f));
        requested
            .or(sp.name_id_format)
            .unwrap_or_default()
            .uri()
            .to_string()
    }

    /// Issues the response to `request` for an authenticated principal.
    ///
    /// # Errors
    ///
    /// - [`SamlError::AccessDenied`] if the SP's processor refuses the
    ///   principal; nothing is built in that case
    /// - [`SamlError::ConfigurationError`] for SPs without settings
    /// - [`SamlError::ResponseConstructionError`] if building or signing fails
    pub fn authenticate(
        &self,
        request: &AuthnRequest,
        principal: &dyn Principal,
    ) -> SamlResult<IssuedResponse> {
        let args = self.response_args(request)?;
        let sp = self.sp_config(&args.sp_entity_id)?;
        let processor = self.processor(&args.sp_entity_id)?;

        if !processor.has_access(principal) {
            tracing::warn!(
                sp = %args.sp_entity_id,
                principal = principal.id(),
                "access denied by processor"
            );
            return Err(SamlError::AccessDenied(format!(
                "{} may not log in to {}",
                principal.username(),
                args.sp_entity_id
            )));
        }

        let identity = processor.create_identity(principal, &sp.mapping());
        let name_id = resolve_name_id(
            principal,
            sp.name_id_field.as_deref(),
            &self.name_id_format(&args, sp),
            &args.destination,
        )?;
        let sign = self.config.sign_flags(sp);

        tracing::debug!(sp = %args.sp_entity_id, attributes = identity.len(), "building response");
        let xml = self.builder.build_authn_response(
            &identity,
            &principal.id().to_string(),
            name_id,
            request.authn_context_class_ref(),
            &args,
            sign,
        )?;
        Ok(IssuedResponse { xml, args, sign })
    }

    /// Answers a passive request that cannot be satisfied without user
    /// interaction.
    ///
    /// # Errors
    ///
    /// See [`IdentityProvider::authenticate`].
    pub fn passive_failure(&self, request: &AuthnRequest) -> SamlResult<IssuedResponse> {
        let args = self.response_args(request)?;
        let sign = self.config.sign_flags(self.sp_config(&args.sp_entity_id)?);
        let xml = self.builder.build_error_response(
            &args,
            &Status::no_passive().with_message("the user is not logged in"),
            sign,
        )?;
        Ok(IssuedResponse { xml, args, sign })
    }

    /// Binds an issued response for the browser, echoing `relay_state`.
    ///
    /// Redirect-bound responses lose their enveloped signature and carry a
    /// detached one instead when the SP wants signed responses.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or signing fails.
    pub fn bind(&self, issued: &IssuedResponse, relay_state: Option<&str>) -> SamlResult<OutboundMessage> {
        let redirect = issued.args.binding == SamlBinding::HttpRedirect;
        let detached_signer = (redirect && issued.sign.sign_response)
            .then(|| self.builder.signer())
            .flatten();
        let xml = if redirect {
            strip_enveloped_signature(&issued.xml)?
        } else {
            issued.xml.clone()
        };
        bindings::apply_binding(
            issued.args.binding,
            &xml,
            &issued.args.destination,
            relay_state,
            SamlMessageType::Response,
            detached_signer,
        )
    }

    /// The IdP's metadata document.
    #[must_use]
    pub fn metadata_xml(&self) -> String {
        IdpMetadata {
            entity_id: self.config.entity_id.clone(),
            sso_location: self.config.sso_url(),
            certificate: self.credential.certificate().clone(),
            name_id_formats: self
                .config
                .name_id_formats
                .iter()
                .map(|f| f.uri().to_string())
                .collect(),
            want_authn_requests_signed: self.config.want_authn_requests_signed,
        }
        .to_xml()
    }
}

const fn is_front_channel(binding: SamlBinding) -> bool {
    matches!(binding, SamlBinding::HttpPost | SamlBinding::HttpRedirect)
}
