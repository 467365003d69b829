//! End-to-End Integration Tests
//!
//! These tests start the IdP server on a random port with configuration
//! written to a scratch directory, and drive it over HTTP.

mod common;
mod saml_flows;
