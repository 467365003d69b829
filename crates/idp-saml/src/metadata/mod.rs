//! SAML metadata.
//!
//! - [`EntityDescriptor`] - parsed SP metadata (endpoints and certificates)
//! - [`MetadataRegistry`] - the set of known SPs, swapped atomically on reload
//! - [`IdpMetadata`] - the IdP's own published metadata document

mod descriptor;
mod idp;
mod registry;

pub use descriptor::*;
pub use idp::*;
pub use registry::*;
