//! SAML 2.0 Identity Provider.
//!
//! Receives `AuthnRequest`s from registered service providers, validates
//! them against SP metadata, maps the logged-in principal to a per-SP
//! attribute identity and answers with a signed `Response`.
//!
//! - [`bindings`] - HTTP-Redirect, HTTP-POST, SOAP and artifact codecs
//! - [`metadata`] - SP metadata registry and IdP metadata generation
//! - [`request`] - `AuthnRequest` parsing and validation
//! - [`identity`] - principals, attribute mapping and access processors
//! - [`response`] - assertion and response construction
//! - [`signature`] - Exclusive C14N and XML-DSig signing/validation
//! - [`idp`] - the [`IdentityProvider`](idp::IdentityProvider) tying them together
//! - [`endpoints`] - Axum handlers for SSO and metadata
//!
//! # Example
//!
//! ```rust,ignore
//! use idp_saml::config::IdpConfig;
//! use idp_saml::endpoints::{saml_router, SamlState};
//! use idp_saml::identity::ProcessorRegistry;
//! use idp_saml::idp::IdentityProvider;
//!
//! let config = IdpConfig::from_file(path)?;
//! let idp = Arc::new(IdentityProvider::from_config(config, &ProcessorRegistry::default())?);
//! let app = saml_router(&idp.config().sso_path)
//!     .with_state(SamlState::new(idp, sessions, principals));
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Metadata](https://docs.oasis-open.org/security/saml/v2.0/saml-metadata-2.0-os.pdf)
//! - [Exclusive XML Canonicalization](https://www.w3.org/TR/xml-exc-c14n/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod identity;
pub mod idp;
pub mod metadata;
pub mod request;
pub mod response;
pub mod signature;
pub mod types;
pub mod xml;

pub use error::{SamlError, SamlResult};
