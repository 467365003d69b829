//! SAML 2.0 types and data structures.
//!
//! Parsed requests, the assertion model handed to the response builder,
//! and the protocol constants they refer to.

mod assertion;
mod authn_request;
mod constants;
mod name_id;
mod response_args;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use name_id::*;
pub use response_args::*;
pub use status::*;
