//! SAML NameID.

use serde::Serialize;

use super::NameIdFormat;

/// Subject identifier emitted in `<saml:Subject>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameId {
    /// The identifier value.
    pub value: String,

    /// Format URI.
    pub format: String,

    /// `SPNameQualifier`; always the computed destination entity.
    pub sp_name_qualifier: Option<String>,

    /// `NameQualifier`; the IdP entity ID when set.
    pub name_qualifier: Option<String>,
}

impl NameId {
    /// Creates a NameID with the given format.
    #[must_use]
    pub fn new(value: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: format.into(),
            sp_name_qualifier: None,
            name_qualifier: None,
        }
    }

    /// Creates an unspecified-format NameID.
    #[must_use]
    pub fn unspecified(value: impl Into<String>) -> Self {
        Self::new(value, NameIdFormat::Unspecified.uri())
    }

    /// Sets the SP name qualifier.
    #[must_use]
    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }

    /// Sets the name qualifier.
    #[must_use]
    pub fn with_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.name_qualifier = Some(qualifier.into());
        self
    }
}
