//! SAML Assertion model.
//!
//! Populated by [`crate::response::ResponseBuilder`] and rendered to XML
//! there; nothing here is persisted.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::NameId;
use crate::identity::{AttributeValue, Identity};

/// A SAML 2.0 Assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assertion {
    /// Assertion `ID`.
    pub id: String,
    /// `IssueInstant`.
    pub issue_instant: DateTime<Utc>,
    /// IdP entity ID.
    pub issuer: String,
    /// Subject with NameID and bearer confirmation.
    pub subject: Subject,
    /// Validity window and audience.
    pub conditions: Conditions,
    /// Authentication statement.
    pub authn_statement: AuthnStatement,
    /// Attributes released to the SP; empty means no statement is emitted.
    pub attributes: Vec<Attribute>,
}

/// `<saml:Subject>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    /// Subject identifier.
    pub name_id: NameId,
    /// Bearer confirmation data.
    pub confirmation: SubjectConfirmationData,
}

/// `<saml:SubjectConfirmationData>` for the bearer method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectConfirmationData {
    /// ACS URL the assertion is delivered to.
    pub recipient: String,
    /// Request ID being answered.
    pub in_response_to: String,
    /// Delivery deadline.
    pub not_on_or_after: DateTime<Utc>,
}

/// `<saml:Conditions>` with a single audience restriction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conditions {
    /// Start of validity.
    pub not_before: DateTime<Utc>,
    /// End of validity.
    pub not_on_or_after: DateTime<Utc>,
    /// Entity ID of the receiving SP.
    pub audience: String,
}

impl Conditions {
    /// Creates conditions valid from `now - skew` until `now + validity`.
    #[must_use]
    pub fn new(audience: impl Into<String>, now: DateTime<Utc>, skew: Duration, validity: Duration) -> Self {
        Self {
            not_before: now - skew,
            not_on_or_after: now + validity,
            audience: audience.into(),
        }
    }
}

/// `<saml:AuthnStatement>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthnStatement {
    /// When the principal authenticated.
    pub authn_instant: DateTime<Utc>,
    /// Session index for the IdP session.
    pub session_index: String,
    /// `AuthnContextClassRef`.
    pub class_ref: String,
}

/// One `<saml:Attribute>` with its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    /// Attribute `Name` (the SP-side output name).
    pub name: String,
    /// Values in order.
    pub values: Vec<AttributeXmlValue>,
}

/// A single `<saml:AttributeValue>` with its `xsi:type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AttributeXmlValue {
    /// `xs:string`.
    String(String),
    /// `xs:integer`.
    Integer(i64),
}

impl AttributeXmlValue {
    /// Returns the `xsi:type` for this value.
    #[must_use]
    pub const fn xsi_type(&self) -> &'static str {
        match self {
            Self::String(_) => "xs:string",
            Self::Integer(_) => "xs:integer",
        }
    }

    /// Returns the text content.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
        }
    }
}

impl Attribute {
    /// Converts an identity into attribute statements, keeping its order.
    #[must_use]
    pub fn from_identity(identity: &Identity) -> Vec<Self> {
        identity
            .iter()
            .map(|(name, value)| Self {
                name: name.to_string(),
                values: match value {
                    AttributeValue::Integer(i) => vec![AttributeXmlValue::Integer(*i)],
                    AttributeValue::List(items) => {
                        items.iter().cloned().map(AttributeXmlValue::String).collect()
                    }
                    other => vec![AttributeXmlValue::String(other.to_string())],
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_window() {
        let now = Utc::now();
        let conditions = Conditions::new(
            "https://sp.example.com",
            now,
            Duration::seconds(60),
            Duration::minutes(5),
        );

        assert_eq!(conditions.not_before, now - Duration::seconds(60));
        assert_eq!(conditions.not_on_or_after, now + Duration::minutes(5));
        assert_eq!(conditions.audience, "https://sp.example.com");
    }

    #[test]
    fn attributes_from_identity_keep_types() {
        let mut identity = Identity::new();
        identity.insert("employeeId", AttributeValue::Integer(42));
        identity.insert(
            "groups",
            AttributeValue::List(vec!["staff".to_string(), "admins".to_string()]),
        );
        identity.insert("uid", AttributeValue::String("alice".to_string()));

        let attrs = Attribute::from_identity(&identity);
        assert_eq!(attrs.len(), 3);

        let employee = attrs.iter().find(|a| a.name == "employeeId").unwrap();
        assert_eq!(employee.values, vec![AttributeXmlValue::Integer(42)]);
        assert_eq!(employee.values[0].xsi_type(), "xs:integer");

        let groups = attrs.iter().find(|a| a.name == "groups").unwrap();
        assert_eq!(groups.values.len(), 2);
    }
}
