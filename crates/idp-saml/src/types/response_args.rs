//! Arguments derived for one response construction.

use serde::Serialize;

use super::SamlBinding;

/// Where and how a response is delivered.
///
/// Computed from a validated [`super::AuthnRequest`] and the metadata
/// registry; `sp_entity_id` becomes the assertion audience and
/// `in_response_to` the response's `InResponseTo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseArgs {
    /// Entity ID of the receiving service provider.
    pub sp_entity_id: String,
    /// Assertion consumer service URL.
    pub destination: String,
    /// Outbound binding.
    pub binding: SamlBinding,
    /// ID of the request being answered.
    pub in_response_to: String,
    /// NameID format requested by the SP, if any.
    pub name_id_format: Option<String>,
}
